//! Storage administration endpoints

use axum::{
    extract::State,
    routing::{delete, post},
    Json, Router,
};
use serde::Serialize;
use weasel_common::time::now_rfc3339;

use crate::error::{ApiError, ApiResult};
use crate::storage::{Containers, ContainerKind, MigrationReport};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ContainerNamesResponse {
    pub raw: String,
    pub processed: String,
    pub backups: String,
}

impl From<&Containers> for ContainerNamesResponse {
    fn from(c: &Containers) -> Self {
        Self {
            raw: c.raw.clone(),
            processed: c.processed.clone(),
            backups: c.backups.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitResponse {
    pub success: bool,
    pub message: String,
    pub containers: ContainerNamesResponse,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub status: String,
    pub message: String,
    pub containers: ContainerNamesResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearResponse {
    pub success: bool,
    pub message: String,
    pub deleted_count: usize,
    pub failed_count: usize,
}

#[derive(Debug, Serialize)]
pub struct MigrateResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: MigrationReport,
}

/// POST /api/admin/init-storage
pub async fn init_storage(State(state): State<AppState>) -> ApiResult<Json<InitResponse>> {
    state.storage.initialize_containers().await?;
    tracing::info!("Storage containers initialized");

    Ok(Json(InitResponse {
        success: true,
        message: "Storage initialized successfully".to_string(),
        containers: state.storage.containers().into(),
        timestamp: now_rfc3339(),
    }))
}

/// GET /api/admin/init-storage
///
/// 503 when the store is unreachable or a container is missing.
pub async fn check_storage(State(state): State<AppState>) -> ApiResult<Json<ConnectionResponse>> {
    match state.storage.containers_ready().await {
        Ok(true) => Ok(Json(ConnectionResponse {
            status: "connected".to_string(),
            message: "Storage is connected and containers exist".to_string(),
            containers: state.storage.containers().into(),
        })),
        Ok(false) => Err(ApiError::ServiceUnavailable("containers missing".to_string())),
        Err(e) => Err(ApiError::ServiceUnavailable(e.to_string())),
    }
}

/// DELETE /api/admin/clear-storage
///
/// Removes every blob in the raw and processed containers; backups are kept.
/// Per-blob failures are counted, not fatal.
pub async fn clear_storage(State(state): State<AppState>) -> ApiResult<Json<ClearResponse>> {
    tracing::info!("Clearing storage");

    let mut deleted_count = 0;
    let mut failed_count = 0;

    for kind in [ContainerKind::Raw, ContainerKind::Processed] {
        let report = state.storage.clear_container(kind).await?;
        deleted_count += report.deleted;
        failed_count += report.failed;
    }

    Ok(Json(ClearResponse {
        success: true,
        message: format!(
            "Storage cleared. Deleted {} files, {} failures.",
            deleted_count, failed_count
        ),
        deleted_count,
        failed_count,
    }))
}

/// POST /api/admin/migrate-paths
pub async fn migrate_paths(State(state): State<AppState>) -> ApiResult<Json<MigrateResponse>> {
    let report = state.storage.migrate_to_flat_paths().await?;
    tracing::info!(
        migrated = report.migrated,
        skipped = report.skipped,
        errors = report.errors.len(),
        "Path migration finished"
    );

    Ok(Json(MigrateResponse {
        success: report.errors.is_empty(),
        report,
    }))
}

/// Build admin routes
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/init-storage", post(init_storage).get(check_storage))
        .route("/api/admin/clear-storage", delete(clear_storage))
        .route("/api/admin/migrate-paths", post(migrate_paths))
}
