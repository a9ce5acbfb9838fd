//! Connection management handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use bi_migration_core::connection;
use bi_migration_core::domain::{
    Asset, Connection, ConnectionTestResult, NewConnection, UpdateConnection,
};
use bi_migration_core::query::ConnectionFilter;

use crate::error::ApiResult;
use crate::state::AppState;

/// Register a new BI tool connection
pub async fn create_connection(
    State(state): State<AppState>,
    Json(req): Json<NewConnection>,
) -> ApiResult<(StatusCode, Json<Connection>)> {
    let connection = connection::create_connection(state.store.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

/// List connections, optionally by BI tool and status
pub async fn list_connections(
    State(state): State<AppState>,
    Query(filter): Query<ConnectionFilter>,
) -> ApiResult<Json<Vec<Connection>>> {
    let connections = connection::get_connections(state.store.as_ref(), &filter).await?;
    Ok(Json(connections))
}

pub async fn update_connection(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<UpdateConnection>,
) -> ApiResult<Json<Connection>> {
    let connection = connection::update_connection(state.store.as_ref(), id, req).await?;
    Ok(Json(connection))
}

/// Probe a connection; failures are reported in the body, not as errors
pub async fn test_connection(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Json<ConnectionTestResult> {
    Json(connection::test_connection(state.store.as_ref(), state.adapter.as_ref(), id).await)
}

/// Pull assets from an active connection
pub async fn sync_assets(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Vec<Asset>>> {
    let assets =
        connection::sync_assets(state.store.as_ref(), state.adapter.as_ref(), id).await?;
    Ok(Json(assets))
}
