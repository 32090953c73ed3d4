//! Status polling for in-flight call logs
//!
//! Tracks uploaded files locally and asks the service for their status on a
//! fixed interval until none is still waiting on analysis.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use weasel_common::metadata::FileStatus;

use crate::api_client::{ApiClient, ClientError, StatusUpdate};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Anything that can report status for a set of file names
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, names: &[String]) -> Result<Vec<StatusUpdate>, ClientError>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, names: &[String]) -> Result<Vec<StatusUpdate>, ClientError> {
        self.status(names).await
    }
}

/// Client-side view of a file's status
///
/// `Queued` exists only locally, between a successful upload and the first
/// status reply from the service. `Missing` marks a name the service did not
/// report, e.g. a typo or a file deleted while being watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedStatus {
    Queued,
    Uploaded,
    Processing,
    Analyzed,
    Error,
    Missing,
}

impl TrackedStatus {
    /// Still waiting on the service
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TrackedStatus::Queued | TrackedStatus::Uploaded | TrackedStatus::Processing)
    }
}

impl From<FileStatus> for TrackedStatus {
    fn from(status: FileStatus) -> Self {
        match status {
            FileStatus::Uploaded => TrackedStatus::Uploaded,
            FileStatus::Processing => TrackedStatus::Processing,
            FileStatus::Analyzed => TrackedStatus::Analyzed,
            FileStatus::Error => TrackedStatus::Error,
        }
    }
}

impl fmt::Display for TrackedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackedStatus::Queued => "queued",
            TrackedStatus::Uploaded => "uploaded",
            TrackedStatus::Processing => "processing",
            TrackedStatus::Analyzed => "analyzed",
            TrackedStatus::Error => "error",
            TrackedStatus::Missing => "missing",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedFile {
    pub name: String,
    pub status: TrackedStatus,
    pub risk_score: Option<f64>,
    pub error_message: Option<String>,
}

pub struct StatusPoller<S> {
    source: S,
    interval: Duration,
    files: BTreeMap<String, TrackedFile>,
}

impl<S: StatusSource> StatusPoller<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            interval: DEFAULT_POLL_INTERVAL,
            files: BTreeMap::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Start (or restart) tracking a file
    pub fn track(&mut self, name: &str, status: TrackedStatus) {
        self.files.insert(
            name.to_string(),
            TrackedFile {
                name: name.to_string(),
                status,
                risk_score: None,
                error_message: None,
            },
        );
    }

    pub fn files(&self) -> impl Iterator<Item = &TrackedFile> {
        self.files.values()
    }

    /// True while any tracked file is in flight
    pub fn is_polling(&self) -> bool {
        self.files.values().any(|f| f.status.is_in_flight())
    }

    fn in_flight_names(&self) -> Vec<String> {
        self.files
            .values()
            .filter(|f| f.status.is_in_flight())
            .map(|f| f.name.clone())
            .collect()
    }

    /// Query in-flight files once and merge the replies
    ///
    /// Returns the files whose status changed. Names missing from the reply
    /// become [`TrackedStatus::Missing`] and are no longer polled.
    pub async fn poll_once(&mut self) -> Result<Vec<TrackedFile>, ClientError> {
        let names = self.in_flight_names();
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let updates = self.source.fetch_status(&names).await?;
        let mut changed = Vec::new();
        let mut unreported: BTreeSet<String> = names.into_iter().collect();

        for update in updates {
            unreported.remove(&update.name);
            let Some(file) = self.files.get_mut(&update.name) else {
                continue;
            };
            let status = TrackedStatus::from(update.status);
            if file.status != status
                || file.risk_score != update.risk_score
                || file.error_message != update.error_message
            {
                file.status = status;
                file.risk_score = update.risk_score;
                file.error_message = update.error_message;
                changed.push(file.clone());
            }
        }

        for name in unreported {
            if let Some(file) = self.files.get_mut(&name) {
                tracing::warn!(filename = %name, "Service does not know this file");
                file.status = TrackedStatus::Missing;
                changed.push(file.clone());
            }
        }

        Ok(changed)
    }

    /// Poll every interval until nothing is in flight
    ///
    /// Failed polls are logged and retried on the next tick.
    pub async fn run_until_settled<F>(&mut self, mut on_change: F)
    where
        F: FnMut(&TrackedFile),
    {
        while self.is_polling() {
            tokio::time::sleep(self.interval).await;

            match self.poll_once().await {
                Ok(changed) => changed.iter().for_each(&mut on_change),
                Err(e) => tracing::warn!(error = %e, "Status poll failed"),
            }
        }
        tracing::debug!("All tracked files settled");
    }
}
