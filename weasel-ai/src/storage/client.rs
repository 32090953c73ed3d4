//! Domain-level storage operations over a [`BlobStore`]

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use weasel_common::metadata::{
    deserialize_metadata, serialize_metadata, FileMetadata, MetadataPatch, RawMetadata,
};
use weasel_common::time::to_rfc3339;
use weasel_common::AnalysisResult;

use super::{retry_blob_operation_with, BlobStore, ContainerKind, Containers, StorageError};
use crate::utils::retry::RetryPolicy;

const DEFAULT_MAX_RESULTS: usize = 1000;
const JSON_CONTENT_TYPE: &str = "application/json";

/// Legacy `YYYY/MM/DD/<name>` blob path
static DATE_PARTITIONED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}/\d{2}/\d{2}/(?P<name>[^/]+)$").expect("valid regex"));

/// Result of storing a blob
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub filename: String,
    pub uploaded_at: String,
    pub size: u64,
    pub path: String,
}

impl UploadResult {
    fn new(filename: &str, metadata: &FileMetadata) -> Self {
        Self {
            filename: filename.to_string(),
            uploaded_at: metadata.uploaded_at.clone(),
            size: metadata.size,
            path: filename.to_string(),
        }
    }
}

/// Filter for [`StorageClient::list_files`]
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Defaults to the raw container
    pub container: Option<ContainerKind>,
    pub date_filter: Option<DateFilter>,
    pub prefix: Option<String>,
    /// Defaults to 1000
    pub max_results: Option<usize>,
}

/// Date components of a legacy partitioned path; each level needs the one above it
#[derive(Debug, Clone, Copy, Default)]
pub struct DateFilter {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl ListOptions {
    fn full_prefix(&self) -> String {
        let mut prefix = String::new();
        if let Some(DateFilter { year: Some(year), month, day }) = self.date_filter {
            prefix.push_str(&format!("{}/", year));
            if let Some(month) = month {
                prefix.push_str(&format!("{:02}/", month));
                if let Some(day) = day {
                    prefix.push_str(&format!("{:02}/", day));
                }
            }
        }
        if let Some(p) = &self.prefix {
            prefix.push_str(p);
        }
        prefix
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub uploaded_at: String,
    pub metadata: FileMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    pub files: Vec<FileEntry>,
    pub total: usize,
    pub has_more: bool,
}

/// Outcome of clearing a container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub deleted: usize,
    pub failed: usize,
}

/// Outcome of flattening date-partitioned paths
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    pub migrated: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Storage operations for call logs, analyses and backups
///
/// Paths are flat: a file's blob name is its filename in every container.
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn BlobStore>,
    containers: Containers,
    retry_policy: RetryPolicy,
}

impl StorageClient {
    pub fn new(store: Arc<dyn BlobStore>, containers: Containers) -> Self {
        Self {
            store,
            containers,
            retry_policy: RetryPolicy::blob(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn containers(&self) -> &Containers {
        &self.containers
    }

    fn container(&self, kind: ContainerKind) -> &str {
        self.containers.name(kind)
    }

    async fn retry<T, F, Fut>(&self, operation_name: &str, operation: F) -> Result<T, StorageError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        retry_blob_operation_with(&self.retry_policy, operation_name, operation).await
    }

    /// Create the three containers if missing
    pub async fn initialize_containers(&self) -> Result<(), StorageError> {
        for kind in ContainerKind::ALL {
            let name = self.container(kind);
            let created = self
                .retry("Create container", || self.store.create_container(name))
                .await
                .map_err(|e| {
                    tracing::error!(container = name, error = %e, "Container initialization failed");
                    e
                })?;
            if created {
                tracing::info!(container = name, "Created storage container");
            }
        }
        tracing::info!("Blob storage containers initialized");
        Ok(())
    }

    /// True when all three containers exist
    pub async fn containers_ready(&self) -> Result<bool, StorageError> {
        for kind in ContainerKind::ALL {
            if !self.store.container_exists(self.container(kind)).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Store `content` under `filename`, replacing any existing blob
    pub async fn upload_file(
        &self,
        content: &[u8],
        filename: &str,
        metadata: &FileMetadata,
        kind: ContainerKind,
    ) -> Result<UploadResult, StorageError> {
        let container = self.container(kind);
        let raw = serialize_metadata(metadata);

        self.retry(&format!("Upload file: {}", filename), || {
            self.store.put(container, filename, content, &metadata.content_type, &raw)
        })
        .await?;

        tracing::debug!(container, filename, size = content.len(), "Uploaded blob");
        Ok(UploadResult::new(filename, metadata))
    }

    /// Store `content` under a name that must not exist yet
    ///
    /// Fails with [`StorageError::AlreadyExists`] when the name is taken; the
    /// stored blob is left as it was.
    pub async fn create_file(
        &self,
        content: &[u8],
        filename: &str,
        metadata: &FileMetadata,
        kind: ContainerKind,
    ) -> Result<UploadResult, StorageError> {
        let container = self.container(kind);
        let raw = serialize_metadata(metadata);

        self.retry(&format!("Create file: {}", filename), || {
            self.store.create(container, filename, content, &metadata.content_type, &raw)
        })
        .await?;

        tracing::debug!(container, filename, size = content.len(), "Created blob");
        Ok(UploadResult::new(filename, metadata))
    }

    pub async fn file_exists(&self, filename: &str, kind: ContainerKind) -> Result<bool, StorageError> {
        let container = self.container(kind);
        self.retry(&format!("Check file: {}", filename), || self.store.exists(container, filename))
            .await
    }

    /// Decoded metadata, or `None` when the blob does not exist
    pub async fn get_file_metadata(
        &self,
        filename: &str,
        kind: ContainerKind,
    ) -> Result<Option<FileMetadata>, StorageError> {
        let container = self.container(kind);
        match self
            .retry(&format!("Get metadata: {}", filename), || self.store.properties(container, filename))
            .await
        {
            Ok(props) => Ok(Some(deserialize_metadata(&props.metadata))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn download_file(&self, filename: &str, kind: ContainerKind) -> Result<Vec<u8>, StorageError> {
        let container = self.container(kind);
        self.retry(&format!("Download file: {}", filename), || self.store.get(container, filename))
            .await
    }

    /// List blobs with their decoded metadata
    ///
    /// Entries with no content, or whose properties can no longer be read, are
    /// skipped: the listing can lag behind deletes.
    pub async fn list_files(&self, options: &ListOptions) -> Result<FileList, StorageError> {
        let container = self.container(options.container.unwrap_or(ContainerKind::Raw));
        let prefix = options.full_prefix();
        let max_results = options.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

        let items = self
            .retry("List files", || self.store.list(container, &prefix, usize::MAX))
            .await?;

        let mut files = Vec::new();
        let mut has_more = false;

        for item in items {
            if files.len() >= max_results {
                has_more = true;
                break;
            }

            if item.content_length == 0 {
                tracing::warn!(blob = %item.name, "Skipping blob with no content");
                continue;
            }

            let props = match self.store.properties(container, &item.name).await {
                Ok(props) => props,
                Err(e) => {
                    tracing::warn!(blob = %item.name, error = %e, "Skipping blob that failed verification");
                    continue;
                }
            };

            files.push(FileEntry {
                path: item.name.clone(),
                name: item.name,
                size: props.content_length,
                uploaded_at: to_rfc3339(&props.created_at),
                metadata: deserialize_metadata(&props.metadata),
            });
        }

        Ok(FileList {
            total: files.len(),
            files,
            has_more,
        })
    }

    /// Merge `patch` over the stored metadata
    pub async fn update_metadata(
        &self,
        filename: &str,
        patch: &MetadataPatch,
        kind: ContainerKind,
    ) -> Result<FileMetadata, StorageError> {
        let container = self.container(kind);
        let operation = format!("Update metadata: {}", filename);

        let props = self
            .retry(&operation, || self.store.properties(container, filename))
            .await?;
        let mut metadata = deserialize_metadata(&props.metadata);
        metadata.apply(patch);

        let raw = serialize_metadata(&metadata);
        self.retry(&operation, || self.store.set_metadata(container, filename, &raw))
            .await?;

        Ok(metadata)
    }

    /// Delete a blob; a missing blob counts as deleted
    pub async fn delete_file(&self, filename: &str, kind: ContainerKind) -> Result<(), StorageError> {
        let container = self.container(kind);
        match self
            .retry(&format!("Delete file: {}", filename), || self.store.delete(container, filename))
            .await
        {
            Ok(()) => {
                tracing::info!(container, filename, "Deleted blob");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::debug!(container, filename, "Blob already absent, nothing to delete");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Copy a raw file into the backups container; returns the backup name
    pub async fn backup_file(&self, filename: &str) -> Result<String, StorageError> {
        let backup_name = backup_filename(filename, &to_rfc3339(&Utc::now()));
        let raw = self.container(ContainerKind::Raw);
        let backups = self.container(ContainerKind::Backups);

        self.retry(&format!("Backup file: {}", filename), || {
            self.store.copy(raw, filename, backups, &backup_name)
        })
        .await?;

        tracing::info!(filename, backup = %backup_name, "Backed up file");
        Ok(backup_name)
    }

    /// Store an analysis as pretty-printed JSON in the processed container
    pub async fn upload_analysis_result(
        &self,
        filename: &str,
        analysis: &AnalysisResult,
    ) -> Result<(), StorageError> {
        let data = serde_json::to_vec_pretty(analysis)?;
        let container = self.container(ContainerKind::Processed);
        let empty = RawMetadata::new();

        self.retry(&format!("Upload analysis result: {}", filename), || {
            self.store.put(container, filename, &data, JSON_CONTENT_TYPE, &empty)
        })
        .await
    }

    /// Stored analysis, or `None` when the file has not been analyzed
    pub async fn download_analysis_result(&self, filename: &str) -> Result<Option<AnalysisResult>, StorageError> {
        match self.download_file(filename, ContainerKind::Processed).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete every blob in a container
    ///
    /// Per-blob failures are logged and counted; only a failed listing aborts.
    pub async fn clear_container(&self, kind: ContainerKind) -> Result<ClearReport, StorageError> {
        let container = self.container(kind);
        let items = self
            .retry("List files", || self.store.list(container, "", usize::MAX))
            .await?;

        let mut report = ClearReport::default();
        for item in items {
            match self.delete_file(&item.name, kind).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    tracing::error!(container, filename = %item.name, error = %e, "Failed to delete blob");
                    report.failed += 1;
                }
            }
        }
        tracing::info!(container, deleted = report.deleted, failed = report.failed, "Cleared container");
        Ok(report)
    }

    /// Move `YYYY/MM/DD/<name>` blobs to `<name>` in every container
    ///
    /// A blob whose flat name is already taken is left in place and counted as
    /// skipped. Per-blob failures are collected rather than aborting the run.
    pub async fn migrate_to_flat_paths(&self) -> Result<MigrationReport, StorageError> {
        let mut report = MigrationReport::default();

        for kind in ContainerKind::ALL {
            let container = self.container(kind);
            let items = self
                .retry("List files", || self.store.list(container, "", usize::MAX))
                .await?;

            for item in items {
                let Some(flat) = DATE_PARTITIONED
                    .captures(&item.name)
                    .and_then(|c| c.name("name"))
                    .map(|m| m.as_str().to_string())
                else {
                    continue;
                };

                if self.file_exists(&flat, kind).await? {
                    tracing::warn!(container, from = %item.name, to = %flat, "Flat name taken, skipping");
                    report.skipped += 1;
                    continue;
                }

                let moved = async {
                    self.retry(&format!("Migrate file: {}", item.name), || {
                        self.store.copy(container, &item.name, container, &flat)
                    })
                    .await?;
                    self.delete_file(&item.name, kind).await
                }
                .await;

                match moved {
                    Ok(()) => {
                        tracing::info!(container, from = %item.name, to = %flat, "Migrated blob");
                        report.migrated += 1;
                    }
                    Err(e) => report.errors.push(format!("{}/{}: {}", container, item.name, e)),
                }
            }
        }

        Ok(report)
    }
}

/// `<stem>_backup_<timestamp>.json`, with `:` and `.` in the timestamp made path-safe
pub fn backup_filename(filename: &str, timestamp: &str) -> String {
    let stamp = timestamp.replace([':', '.'], "-");
    match filename.find(".json") {
        Some(_) => filename.replacen(".json", &format!("_backup_{}.json", stamp), 1),
        None => format!("{}_backup_{}", filename, stamp),
    }
}
