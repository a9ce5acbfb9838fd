//! Migration job handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use bi_migration_core::domain::{
    MigrationHistoryEntry, MigrationJob, NewMigrationJob, UpdateMigrationJob,
};
use bi_migration_core::migration;
use bi_migration_core::query::MigrationJobFilter;

use crate::error::ApiResult;
use crate::state::AppState;

/// Create a migration job over existing assets
pub async fn create_migration_job(
    State(state): State<AppState>,
    Json(req): Json<NewMigrationJob>,
) -> ApiResult<(StatusCode, Json<MigrationJob>)> {
    let job = migration::create_migration_job(state.store.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// List migration jobs, optionally by status and target type
pub async fn list_migration_jobs(
    State(state): State<AppState>,
    Query(filter): Query<MigrationJobFilter>,
) -> ApiResult<Json<Vec<MigrationJob>>> {
    let jobs = migration::get_migration_jobs(state.store.as_ref(), &filter).await?;
    Ok(Json(jobs))
}

pub async fn get_migration_job(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<MigrationJob>> {
    let job = migration::get_migration_job(state.store.as_ref(), id).await?;
    Ok(Json(job))
}

/// Update status, progress, error message or configs of a job
pub async fn update_migration_job(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(req): Json<UpdateMigrationJob>,
) -> ApiResult<Json<MigrationJob>> {
    let job = migration::update_migration_job(state.store.as_ref(), id, req).await?;
    Ok(Json(job))
}

pub async fn cancel_migration_job(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<MigrationJob>> {
    let job = migration::cancel_migration_job(state.store.as_ref(), id).await?;
    Ok(Json(job))
}

/// Status history of a job, oldest first
pub async fn get_migration_history(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Json<Vec<MigrationHistoryEntry>>> {
    let history = migration::get_migration_history(state.store.as_ref(), id).await?;
    Ok(Json(history))
}
