//! Asset handlers

use std::path::Path as FsPath;

use axum::{
    body::Bytes,
    extract::{Multipart, Query, State},
    http::StatusCode,
    Json,
};
use tracing::warn;
use uuid::Uuid;

use bi_migration_core::asset::{self, UploadedFile};
use bi_migration_core::domain::Asset;
use bi_migration_core::query::AssetFilter;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// List assets, optionally by connection and type
pub async fn list_assets(
    State(state): State<AppState>,
    Query(filter): Query<AssetFilter>,
) -> ApiResult<Json<Vec<Asset>>> {
    let assets = asset::get_assets(state.store.as_ref(), &filter).await?;
    Ok(Json(assets))
}

/// Upload a Tableau or Power BI workbook and register it as an asset
///
/// Multipart fields: `connection_id` and `file`.
pub async fn upload_asset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Asset>)> {
    let mut connection_id: Option<i32> = None;
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Multipart error: {}", e)))?
    {
        match field.name() {
            Some("connection_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))?;
                let id = text.trim().parse().map_err(|_| {
                    ApiError::BadRequest(format!("Invalid connection_id '{}'", text))
                })?;
                connection_id = Some(id);
            }
            Some("file") => {
                let file_name = field
                    .file_name()
                    .and_then(|name| FsPath::new(name).file_name())
                    .and_then(|name| name.to_str())
                    .map(|name| name.to_string())
                    .ok_or_else(|| ApiError::BadRequest("File name is required".to_string()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?;
                upload = Some((file_name, data));
            }
            _ => {}
        }
    }

    let connection_id = connection_id
        .ok_or_else(|| ApiError::BadRequest("Missing 'connection_id' field".to_string()))?;
    let (file_name, data) =
        upload.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".to_string()))?;

    // reject unsupported formats before anything touches the disk
    asset::parse_workbook(&file_name, data.len() as u64)?;

    let upload_dir = format!("{}/{}", state.config.upload_dir, Uuid::new_v4());
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to create upload directory: {}", e)))?;
    let file_path = format!("{}/{}", upload_dir, file_name);
    tokio::fs::write(&file_path, &data)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to write file: {}", e)))?;

    let file = UploadedFile {
        file_name,
        size_bytes: data.len() as u64,
        stored_path: Some(file_path),
    };

    match asset::ingest_uploaded_file(
        state.store.as_ref(),
        state.adapter.as_ref(),
        connection_id,
        file,
    )
    .await
    {
        Ok(asset) => Ok((StatusCode::CREATED, Json(asset))),
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_dir_all(&upload_dir).await {
                warn!("Failed to remove upload directory {}: {}", upload_dir, cleanup);
            }
            Err(e.into())
        }
    }
}
