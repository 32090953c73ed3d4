//! File record endpoints: listing, status polling, content, metadata, delete

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weasel_common::metadata::{FileStatus, MetadataPatch};
use weasel_common::RiskLevel;

use crate::error::{ApiError, ApiResult};
use crate::storage::{ContainerKind, FileEntry, ListOptions};
use crate::AppState;

/// Cache policy for a finished transcript + analysis pair
const COMPLETE_CACHE_CONTROL: &str = "public, max-age=300, stale-while-revalidate=600";

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<FileStatus>,
    pub prefix: Option<String>,
}

/// One row of the file list
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSummary {
    pub id: String,
    pub name: String,
    pub original_name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub uploaded_at: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<FileEntry> for FileSummary {
    fn from(entry: FileEntry) -> Self {
        let m = entry.metadata;
        Self {
            id: entry.name.clone(),
            original_name: if m.original_filename == "unknown" {
                entry.name.clone()
            } else {
                m.original_filename
            },
            name: entry.name,
            size: entry.size,
            content_type: m.content_type,
            uploaded_at: m.uploaded_at,
            status: m.status,
            call_id: m.call_id,
            agent_name: m.agent_name,
            agent_id: m.agent_id,
            call_duration: m.call_duration,
            call_timestamp: m.call_timestamp,
            risk_level: RiskLevel::from_score(m.risk_score),
            risk_score: m.risk_score,
            error_message: m.error_message,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub files: Vec<FileSummary>,
}

/// Reference to a tracked file; `uploadedAt` predates flat paths and is ignored
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub name: String,
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

/// Either `{"files": [{name, uploadedAt}]}` or `{"fileNames": [..]}`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    #[serde(default)]
    pub files: Option<Vec<FileRef>>,
    #[serde(default)]
    pub file_names: Option<Vec<String>>,
}

impl StatusRequest {
    fn names(self) -> Option<Vec<String>> {
        match (self.files, self.file_names) {
            (None, None) => None,
            (files, names) => {
                let mut all: Vec<String> = files
                    .unwrap_or_default()
                    .into_iter()
                    .map(|f| f.name)
                    .collect();
                all.extend(names.unwrap_or_default());
                Some(all)
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub name: String,
    pub status: FileStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub updates: Vec<StatusUpdate>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub success: bool,
    pub transcript: Option<Value>,
    pub analysis: Option<Value>,
    pub filename: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyDateQuery {
    #[serde(default)]
    pub uploaded_at: Option<String>,
}

/// GET /api/files
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let listing = state
        .storage
        .list_files(&ListOptions {
            prefix: query.prefix,
            ..ListOptions::default()
        })
        .await?;

    let files: Vec<FileSummary> = listing
        .files
        .into_iter()
        .filter(|f| query.status.map_or(true, |s| f.metadata.status == s))
        .map(FileSummary::from)
        .collect();

    tracing::debug!(count = files.len(), has_more = listing.has_more, "Listed files");

    Ok(Json(ListResponse { success: true, files }))
}

/// POST /api/files/status
///
/// Names with no stored record are left out of the reply.
pub async fn file_status(
    State(state): State<AppState>,
    Json(request): Json<StatusRequest>,
) -> ApiResult<Json<StatusResponse>> {
    let names = request
        .names()
        .ok_or_else(|| ApiError::BadRequest("fileNames must be an array".to_string()))?;

    let mut updates = Vec::with_capacity(names.len());
    for name in names {
        if let Some(metadata) = state.storage.get_file_metadata(&name, ContainerKind::Raw).await? {
            updates.push(StatusUpdate {
                name,
                status: metadata.status,
                risk_score: metadata.risk_score,
                error_message: metadata.error_message,
            });
        }
    }

    Ok(Json(StatusResponse { updates }))
}

/// GET /api/files/:filename
pub async fn get_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(_legacy): Query<LegacyDateQuery>,
) -> ApiResult<Json<Value>> {
    let bytes = state.storage.download_file(&filename, ContainerKind::Raw).await?;
    let document: Value = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::Internal(format!("Stored call log {} is not JSON: {}", filename, e)))?;
    Ok(Json(document))
}

/// PATCH /api/files/:filename
pub async fn update_file_metadata(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Json(patch): Json<MetadataPatch>,
) -> ApiResult<Json<MessageResponse>> {
    if !state.storage.file_exists(&filename, ContainerKind::Raw).await? {
        return Err(ApiError::NotFound("File not found.".to_string()));
    }

    state
        .storage
        .update_metadata(&filename, &patch, ContainerKind::Raw)
        .await?;

    tracing::info!(filename = %filename, "Metadata updated");

    Ok(Json(MessageResponse {
        success: true,
        message: "Metadata updated successfully.".to_string(),
    }))
}

/// DELETE /api/files/:filename
///
/// Removes the call log and its analysis. Deleting a missing file succeeds.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(_legacy): Query<LegacyDateQuery>,
) -> ApiResult<Json<DeleteResponse>> {
    state.storage.delete_file(&filename, ContainerKind::Raw).await?;
    state.storage.delete_file(&filename, ContainerKind::Processed).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("{} deleted successfully.", filename),
        filename,
    }))
}

/// GET /api/files/:filename/complete
///
/// Transcript and analysis in one round trip; either is null when absent.
pub async fn get_complete(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Query(_legacy): Query<LegacyDateQuery>,
) -> ApiResult<impl IntoResponse> {
    let (raw, processed) = tokio::join!(
        state.storage.download_file(&filename, ContainerKind::Raw),
        state.storage.download_file(&filename, ContainerKind::Processed),
    );

    let transcript = parse_optional_json(&filename, "transcript", raw)?.map(|doc| match doc.get("transcript") {
        Some(turns) => turns.clone(),
        None => doc,
    });
    let analysis = parse_optional_json(&filename, "analysis", processed)?;

    let cache_control = if analysis.is_some() {
        COMPLETE_CACHE_CONTROL
    } else {
        "no-cache"
    };

    Ok((
        [(header::CACHE_CONTROL, cache_control)],
        Json(CompleteResponse {
            success: true,
            transcript,
            analysis,
            filename,
        }),
    ))
}

/// Missing blobs and unparseable content read as `None`; other failures propagate
fn parse_optional_json(
    filename: &str,
    what: &str,
    result: Result<Vec<u8>, crate::storage::StorageError>,
) -> ApiResult<Option<Value>> {
    match result {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(filename, what, error = %e, "Stored JSON unparseable");
                Ok(None)
            }
        },
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Build file routes
pub fn file_routes() -> Router<AppState> {
    Router::new()
        .route("/api/files", get(list_files))
        .route("/api/files/status", post(file_status))
        .route(
            "/api/files/:filename",
            get(get_file).patch(update_file_metadata).delete(delete_file),
        )
        .route("/api/files/:filename/complete", get(get_complete))
}
