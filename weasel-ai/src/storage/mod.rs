//! Blob storage for call logs and analysis results
//!
//! Three containers hold everything the service persists:
//! - raw: uploaded call logs, one blob per filename, carrying the file record
//!   as blob metadata
//! - processed: analysis results as pretty-printed JSON under the same name
//! - backups: copies taken before a replace
//!
//! [`BlobStore`] is the backend seam; [`SqliteBlobStore`] is the production
//! backend. [`StorageClient`] layers the domain operations and retries on top.

pub mod client;
pub mod sqlite;

pub use client::{
    ClearReport, DateFilter, FileEntry, FileList, ListOptions, MigrationReport, StorageClient,
    UploadResult,
};
pub use sqlite::SqliteBlobStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use thiserror::Error;
use weasel_common::config::{
    DEFAULT_BACKUPS_CONTAINER, DEFAULT_PROCESSED_CONTAINER, DEFAULT_RAW_CONTAINER,
};
use weasel_common::metadata::RawMetadata;

use crate::utils::retry::{retry_with_backoff, RetryPolicy, Retryable};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {container}/{name}")]
    NotFound { container: String, name: String },

    #[error("Blob already exists: {container}/{name}")]
    AlreadyExists { container: String, name: String },

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    /// Failure the backend reports as temporary (lock contention, timeouts)
    #[error("{code}: {message}")]
    Transient { code: &'static str, message: String },

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("{operation} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn not_found(container: &str, name: &str) -> Self {
        StorageError::NotFound {
            container: container.to_string(),
            name: name.to_string(),
        }
    }

    pub fn already_exists(container: &str, name: &str) -> Self {
        StorageError::AlreadyExists {
            container: container.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

impl Retryable for StorageError {
    fn retry_code(&self) -> Option<&str> {
        match self {
            StorageError::Transient { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) => {
                let message = db_err.message().to_string();
                if message.contains("database is locked") || message.contains("busy") {
                    StorageError::Transient { code: "ServerBusy", message }
                } else {
                    StorageError::Backend(message)
                }
            }
            sqlx::Error::PoolTimedOut => StorageError::Transient {
                code: "OperationTimedOut",
                message: "connection pool timed out".to_string(),
            },
            sqlx::Error::Io(io_err) => StorageError::Transient {
                code: "ECONNRESET",
                message: io_err.to_string(),
            },
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// Properties of a stored blob
#[derive(Debug, Clone, PartialEq)]
pub struct BlobProperties {
    pub content_length: u64,
    pub content_type: String,
    pub metadata: RawMetadata,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// One entry of a container listing
#[derive(Debug, Clone, PartialEq)]
pub struct BlobItem {
    pub name: String,
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
}

/// Backend blob store
///
/// Operations on a missing container fail with
/// [`StorageError::ContainerNotFound`]; reads, deletes and metadata writes on a
/// missing blob fail with [`StorageError::NotFound`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create a container; returns false when it already existed
    async fn create_container(&self, container: &str) -> Result<bool, StorageError>;

    async fn container_exists(&self, container: &str) -> Result<bool, StorageError>;

    /// Store a new blob; fails with [`StorageError::AlreadyExists`] when the
    /// name is taken and leaves the existing blob untouched
    async fn create(
        &self,
        container: &str,
        name: &str,
        content: &[u8],
        content_type: &str,
        metadata: &RawMetadata,
    ) -> Result<(), StorageError>;

    /// Store a blob, replacing any existing blob of the same name
    async fn put(
        &self,
        container: &str,
        name: &str,
        content: &[u8],
        content_type: &str,
        metadata: &RawMetadata,
    ) -> Result<(), StorageError>;

    async fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError>;

    async fn properties(&self, container: &str, name: &str) -> Result<BlobProperties, StorageError>;

    async fn exists(&self, container: &str, name: &str) -> Result<bool, StorageError>;

    /// Replace the blob's metadata map
    async fn set_metadata(
        &self,
        container: &str,
        name: &str,
        metadata: &RawMetadata,
    ) -> Result<(), StorageError>;

    /// Blobs whose name starts with `prefix`, in name order
    async fn list(
        &self,
        container: &str,
        prefix: &str,
        max_results: usize,
    ) -> Result<Vec<BlobItem>, StorageError>;

    async fn delete(&self, container: &str, name: &str) -> Result<(), StorageError>;

    /// Copy content, type and metadata to another container/name
    async fn copy(
        &self,
        source_container: &str,
        source_name: &str,
        dest_container: &str,
        dest_name: &str,
    ) -> Result<(), StorageError>;
}

/// Which of the three containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Raw,
    Processed,
    Backups,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 3] = [ContainerKind::Raw, ContainerKind::Processed, ContainerKind::Backups];
}

/// Configured container names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Containers {
    pub raw: String,
    pub processed: String,
    pub backups: String,
}

impl Default for Containers {
    fn default() -> Self {
        Self {
            raw: DEFAULT_RAW_CONTAINER.to_string(),
            processed: DEFAULT_PROCESSED_CONTAINER.to_string(),
            backups: DEFAULT_BACKUPS_CONTAINER.to_string(),
        }
    }
}

impl Containers {
    pub fn name(&self, kind: ContainerKind) -> &str {
        match kind {
            ContainerKind::Raw => &self.raw,
            ContainerKind::Processed => &self.processed,
            ContainerKind::Backups => &self.backups,
        }
    }
}

/// Run a blob operation under the blob retry preset
pub async fn retry_blob_operation<T, F, Fut>(operation_name: &str, operation: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    retry_blob_operation_with(&RetryPolicy::blob(), operation_name, operation).await
}

/// [`retry_blob_operation`] with an explicit policy
///
/// A retryable failure that survives every attempt becomes
/// [`StorageError::RetriesExhausted`]; any other failure is returned as-is.
pub async fn retry_blob_operation_with<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let outcome = retry_with_backoff(policy, operation_name, operation).await;
    let attempts = outcome.attempts;

    match outcome.result {
        Ok(value) => {
            if attempts > 1 {
                tracing::info!(
                    operation = operation_name,
                    attempts,
                    elapsed_ms = outcome.total_duration.as_millis() as u64,
                    "Blob operation succeeded after retry"
                );
            }
            Ok(value)
        }
        Err(err) if policy.is_retryable(&err) => {
            tracing::error!(
                operation = operation_name,
                attempts,
                error = %err,
                "Blob operation failed after retries"
            );
            Err(StorageError::RetriesExhausted {
                operation: operation_name.to_string(),
                attempts,
                message: err.to_string(),
            })
        }
        Err(err) => Err(err),
    }
}
