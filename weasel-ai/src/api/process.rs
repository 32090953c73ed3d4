//! Analysis trigger endpoint

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use weasel_common::metadata::FileStatus;

use crate::error::{ApiError, ApiResult};
use crate::storage::ContainerKind;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ProcessQuery {
    /// Wait for the analysis to finish instead of queueing it
    #[serde(default)]
    pub wait: bool,
}

/// Optional body; `uploadedAt` predates flat paths and is ignored
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessBody {
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FileStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// POST /api/process/:filename
pub async fn process_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(query): Query<ProcessQuery>,
    body: Bytes,
) -> ApiResult<Json<ProcessResponse>> {
    // The body is optional and carries nothing the service still needs
    if !body.is_empty() {
        if let Err(e) = serde_json::from_slice::<ProcessBody>(&body) {
            tracing::debug!(filename = %filename, error = %e, "Ignoring unparseable process body");
        }
    }

    if !state.storage.file_exists(&filename, ContainerKind::Raw).await? {
        return Err(ApiError::NotFound(format!("File not found: {}", filename)));
    }

    if !query.wait {
        state.pipeline.trigger(&filename)?;
        return Ok(Json(ProcessResponse {
            success: true,
            message: format!("Analysis for {} has been queued.", filename),
            status: None,
            risk_score: None,
            error_message: None,
        }));
    }

    let outcome = state.pipeline.run(&filename).await?;
    let success = outcome.status == FileStatus::Analyzed;

    Ok(Json(ProcessResponse {
        success,
        message: if success {
            format!("Analysis for {} completed.", filename)
        } else {
            format!("Analysis for {} failed.", filename)
        },
        status: Some(outcome.status),
        risk_score: outcome.risk_score,
        error_message: outcome.error_message,
    }))
}

/// Build process routes
pub fn process_routes() -> Router<AppState> {
    Router::new().route("/api/process/:filename", post(process_file))
}
