//! API route definitions

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let max_upload = state.config.max_upload_bytes;

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Connections
        .route(
            "/api/connections",
            post(handlers::connections::create_connection)
                .get(handlers::connections::list_connections),
        )
        .route(
            "/api/connections/:id",
            patch(handlers::connections::update_connection),
        )
        .route(
            "/api/connections/:id/test",
            post(handlers::connections::test_connection),
        )
        .route(
            "/api/connections/:id/sync",
            post(handlers::connections::sync_assets),
        )
        // Assets
        .route("/api/assets", get(handlers::assets::list_assets))
        .route(
            "/api/assets/upload",
            post(handlers::assets::upload_asset).layer(DefaultBodyLimit::max(max_upload)),
        )
        // Migration jobs
        .route(
            "/api/migrations",
            post(handlers::migrations::create_migration_job)
                .get(handlers::migrations::list_migration_jobs),
        )
        .route(
            "/api/migrations/:id",
            get(handlers::migrations::get_migration_job)
                .patch(handlers::migrations::update_migration_job),
        )
        .route(
            "/api/migrations/:id/cancel",
            post(handlers::migrations::cancel_migration_job),
        )
        .route(
            "/api/migrations/:id/history",
            get(handlers::migrations::get_migration_history),
        )
        // Layers
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
