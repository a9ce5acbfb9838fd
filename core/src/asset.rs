//! Asset listing and uploaded workbook ingestion

use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::adapter::{BiToolAdapter, UploadedWorkbook, WorkbookFormat};
use crate::domain::{Asset, NewAsset};
use crate::error::{CoreError, Result};
use crate::query::AssetFilter;
use crate::store::EntityStore;

pub async fn get_assets<S>(store: &S, filter: &AssetFilter) -> Result<Vec<Asset>>
where
    S: EntityStore + ?Sized,
{
    store.list_assets(filter).await
}

/// An uploaded file as received from the caller
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub size_bytes: u64,
    /// Where the bytes were written, if they were kept
    pub stored_path: Option<String>,
}

/// Work out the workbook format from a file name
pub fn parse_workbook(file_name: &str, size_bytes: u64) -> Result<UploadedWorkbook> {
    let path = Path::new(file_name);
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let format = WorkbookFormat::from_extension(&extension).ok_or_else(|| {
        CoreError::Validation(format!(
            "Unsupported file '{}': expected a .twbx, .pbi or .pbix file",
            file_name
        ))
    })?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .unwrap_or_default();
    if stem.is_empty() {
        return Err(CoreError::Validation(format!(
            "File name '{}' has no name before its extension",
            file_name
        )));
    }

    Ok(UploadedWorkbook {
        format,
        stem: stem.to_string(),
        size_bytes,
    })
}

fn upload_external_id(stem: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("upload_{}_{}", slug::slugify(stem), &suffix[..8])
}

/// Register an uploaded BI workbook as an asset of `connection_id`
pub async fn ingest_uploaded_file<S, A>(
    store: &S,
    adapter: &A,
    connection_id: i32,
    file: UploadedFile,
) -> Result<Asset>
where
    S: EntityStore + ?Sized,
    A: BiToolAdapter + ?Sized,
{
    let workbook = parse_workbook(&file.file_name, file.size_bytes)?;

    let connection = store
        .get_connection(connection_id)
        .await?
        .ok_or_else(|| CoreError::connection_not_found(connection_id))?;

    if workbook.format.bi_tool() != connection.bi_tool {
        return Err(CoreError::Validation(format!(
            "'{}' is a {} file but connection {} is a {} connection",
            file.file_name,
            workbook.format.bi_tool(),
            connection_id,
            connection.bi_tool
        )));
    }

    let mut metadata = adapter.extract_workbook_metadata(&workbook).await?;
    metadata.insert("source".to_string(), Value::from("upload"));
    metadata.insert(
        "original_filename".to_string(),
        Value::from(file.file_name.clone()),
    );
    if let Some(path) = &file.stored_path {
        metadata.insert("stored_path".to_string(), Value::from(path.clone()));
    }

    let asset = NewAsset {
        connection_id,
        external_id: upload_external_id(&workbook.stem),
        name: workbook.stem.clone(),
        description: Some(format!(
            "Uploaded {} file: {}",
            workbook.format.bi_tool(),
            workbook.stem
        )),
        asset_type: workbook.format.asset_type(),
        metadata,
    };

    let asset = store.insert_asset(asset, Utc::now()).await?;
    info!(
        "Registered uploaded file {} as asset {} on connection {}",
        file.file_name, asset.id, connection_id
    );
    Ok(asset)
}
