//! Call log upload and replace endpoints

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use weasel_common::metadata::{FileMetadata, FileStatus};

use crate::error::{ApiError, ApiResult};
use crate::storage::ContainerKind;
use crate::validation::{validate_upload, ValidatedUpload, ValidationError};
use crate::AppState;

const FILE_FIELD: &str = "file";

/// File record fields echoed back after an upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub name: String,
    pub size: u64,
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
}

impl UploadedFile {
    fn new(name: &str, metadata: &FileMetadata) -> Self {
        Self {
            name: name.to_string(),
            size: metadata.size,
            uploaded_at: metadata.uploaded_at.clone(),
            status: metadata.status,
            call_id: metadata.call_id.clone(),
            agent_name: metadata.agent_name.clone(),
            agent_id: metadata.agent_id.clone(),
            call_duration: metadata.call_duration,
            call_timestamp: metadata.call_timestamp.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub file: UploadedFile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceResponse {
    pub success: bool,
    pub message: String,
    pub backup_filename: String,
    pub file: UploadedFile,
}

/// Pull the `file` part out of the form and validate it
async fn read_upload(mut multipart: Multipart, max_file_size_mb: u64) -> ApiResult<ValidatedUpload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        return Ok(validate_upload(
            &filename,
            content_type.as_deref(),
            bytes.to_vec(),
            max_file_size_mb,
        )?);
    }

    Err(ValidationError::NoFile.into())
}

/// How the raw blob is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Fail with a collision when the name is taken
    CreateNew,
    Overwrite,
}

/// Store a validated upload as a fresh `uploaded` record and queue analysis
async fn store_and_queue(state: &AppState, upload: &ValidatedUpload, mode: WriteMode) -> ApiResult<FileMetadata> {
    let metadata = FileMetadata::for_upload(
        &upload.filename,
        upload.size(),
        &upload.content_type,
        &upload.summary,
    );

    let storage = &state.storage;
    match mode {
        WriteMode::CreateNew => {
            storage
                .create_file(&upload.bytes, &upload.filename, &metadata, ContainerKind::Raw)
                .await?
        }
        WriteMode::Overwrite => {
            storage
                .upload_file(&upload.bytes, &upload.filename, &metadata, ContainerKind::Raw)
                .await?
        }
    };

    if let Err(e) = state.pipeline.trigger(&upload.filename) {
        tracing::warn!(filename = %upload.filename, error = %e, "Upload stored but analysis not queued");
    }

    Ok(metadata)
}

/// POST /api/upload
pub async fn upload_file(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Json<UploadResponse>> {
    let upload = read_upload(multipart, state.max_file_size_mb).await?;

    let metadata = match store_and_queue(&state, &upload, WriteMode::CreateNew).await {
        Ok(metadata) => metadata,
        Err(ApiError::Collision { filename }) => {
            tracing::info!(filename = %filename, "Upload rejected, name already taken");
            return Err(ApiError::Collision { filename });
        }
        Err(e) => return Err(e),
    };
    tracing::info!(filename = %upload.filename, size = upload.size(), "Call log uploaded");

    Ok(Json(UploadResponse {
        success: true,
        file: UploadedFile::new(&upload.filename, &metadata),
    }))
}

/// POST /api/upload/replace
///
/// Backs up the existing file before overwriting it; nothing is deleted if
/// the backup fails.
pub async fn replace_file(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Json<ReplaceResponse>> {
    let upload = read_upload(multipart, state.max_file_size_mb).await?;
    let filename = upload.filename.clone();

    if !state.storage.file_exists(&filename, ContainerKind::Raw).await? {
        return Err(ApiError::NotFound("Original file not found. Cannot replace.".to_string()));
    }

    let backup_filename = state.storage.backup_file(&filename).await?;

    state.storage.delete_file(&filename, ContainerKind::Raw).await?;
    state.storage.delete_file(&filename, ContainerKind::Processed).await?;

    let metadata = match store_and_queue(&state, &upload, WriteMode::Overwrite).await {
        Ok(metadata) => metadata,
        Err(e) => {
            tracing::error!(filename = %filename, backup = %backup_filename, "Replace failed after original was removed");
            return Err(e);
        }
    };

    tracing::info!(filename = %filename, backup = %backup_filename, "Call log replaced");

    Ok(Json(ReplaceResponse {
        success: true,
        message: "File replaced successfully. Original backed up.".to_string(),
        backup_filename,
        file: UploadedFile::new(&filename, &metadata),
    }))
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/api/upload", post(upload_file))
        .route("/api/upload/replace", post(replace_file))
}
