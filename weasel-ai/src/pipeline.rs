//! Upload → analysis pipeline
//!
//! A run moves a raw file record through `processing` to `analyzed` or
//! `error`, storing the analysis beside it in the processed container. At most
//! one run per filename is active in this process.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use weasel_common::call_log::TranscriptTurn;
use weasel_common::metadata::{FileStatus, MetadataPatch};
use weasel_common::time::now_rfc3339;
use weasel_common::AnalysisResult;

use crate::services::{AnalysisError, ComplianceAnalyzer};
use crate::services::compliance::DEFAULT_MAX_ATTEMPTS;
use crate::storage::{ContainerKind, ListOptions, StorageClient, StorageError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Analysis already running for {0}")]
    AlreadyRunning(String),

    #[error("Invalid call log: {0}")]
    InvalidCallLog(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Final state of an awaited run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: FileStatus,
    pub risk_score: Option<f64>,
    pub error_message: Option<String>,
}

type ActiveSet = Arc<Mutex<HashSet<String>>>;

/// Holds a filename in the active set until dropped
struct ActiveGuard {
    active: ActiveSet,
    filename: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.filename);
    }
}

#[derive(Clone)]
pub struct Pipeline {
    storage: StorageClient,
    analyzer: ComplianceAnalyzer,
    active: ActiveSet,
    max_attempts: u32,
}

impl Pipeline {
    pub fn new(storage: StorageClient, analyzer: ComplianceAnalyzer) -> Self {
        Self {
            storage,
            analyzer,
            active: Arc::new(Mutex::new(HashSet::new())),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn is_active(&self, filename: &str) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.contains(filename)
    }

    fn acquire(&self, filename: &str) -> Result<ActiveGuard, PipelineError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(filename.to_string()) {
            return Err(PipelineError::AlreadyRunning(filename.to_string()));
        }
        Ok(ActiveGuard {
            active: self.active.clone(),
            filename: filename.to_string(),
        })
    }

    /// Start a background run; returns once the run is registered
    pub fn trigger(&self, filename: &str) -> Result<(), PipelineError> {
        let guard = self.acquire(filename)?;
        let pipeline = self.clone();
        let filename = filename.to_string();
        tracing::info!(filename = %filename, "Analysis queued");

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = pipeline.execute(&filename).await {
                tracing::error!(filename = %filename, error = %e, "Background analysis failed");
            }
        });

        Ok(())
    }

    /// Run the analysis and wait for it to finish
    pub async fn run(&self, filename: &str) -> Result<RunOutcome, PipelineError> {
        let _guard = self.acquire(filename)?;
        self.execute(filename).await
    }

    /// Re-trigger records left `uploaded` or `processing` by a previous process
    pub async fn recover_pending(&self) -> Result<usize, PipelineError> {
        let listing = self
            .storage
            .list_files(&ListOptions {
                max_results: Some(usize::MAX),
                ..ListOptions::default()
            })
            .await?;

        let mut recovered = 0;
        for entry in listing.files {
            if !matches!(entry.metadata.status, FileStatus::Uploaded | FileStatus::Processing) {
                continue;
            }
            match self.trigger(&entry.name) {
                Ok(()) => recovered += 1,
                Err(e) => tracing::warn!(filename = %entry.name, error = %e, "Could not recover pending file"),
            }
        }

        if recovered > 0 {
            tracing::info!(recovered, "Re-queued pending analyses");
        }
        Ok(recovered)
    }

    async fn execute(&self, filename: &str) -> Result<RunOutcome, PipelineError> {
        if self
            .storage
            .get_file_metadata(filename, ContainerKind::Raw)
            .await?
            .is_none()
        {
            return Err(PipelineError::NotFound(filename.to_string()));
        }

        let started = Instant::now();
        let started_at = now_rfc3339();

        self.storage
            .update_metadata(
                filename,
                &MetadataPatch {
                    status: Some(FileStatus::Processing),
                    processing_started_at: Some(started_at),
                    processing_completed_at: Some(String::new()),
                    error_message: Some(String::new()),
                    ..MetadataPatch::default()
                },
                ContainerKind::Raw,
            )
            .await?;

        tracing::info!(filename, "Analysis started");

        match self.analyze(filename).await {
            Ok(analysis) => {
                self.storage
                    .update_metadata(
                        filename,
                        &MetadataPatch {
                            status: Some(FileStatus::Analyzed),
                            risk_score: Some(analysis.risk_score),
                            processing_completed_at: Some(now_rfc3339()),
                            error_message: Some(String::new()),
                            ..MetadataPatch::default()
                        },
                        ContainerKind::Raw,
                    )
                    .await?;

                tracing::info!(
                    filename,
                    risk_score = analysis.risk_score,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Analysis complete"
                );

                Ok(RunOutcome {
                    status: FileStatus::Analyzed,
                    risk_score: Some(analysis.risk_score),
                    error_message: None,
                })
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(
                    filename,
                    error = %message,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Analysis failed"
                );

                self.storage
                    .update_metadata(
                        filename,
                        &MetadataPatch {
                            status: Some(FileStatus::Error),
                            processing_completed_at: Some(now_rfc3339()),
                            error_message: Some(message.clone()),
                            ..MetadataPatch::default()
                        },
                        ContainerKind::Raw,
                    )
                    .await?;

                Ok(RunOutcome {
                    status: FileStatus::Error,
                    risk_score: None,
                    error_message: Some(message),
                })
            }
        }
    }

    async fn analyze(&self, filename: &str) -> Result<AnalysisResult, PipelineError> {
        let bytes = self.storage.download_file(filename, ContainerKind::Raw).await?;
        let transcript = parse_transcript(&bytes)?;

        let analysis = self
            .analyzer
            .get_compliance_analysis(&transcript, self.max_attempts)
            .await?;

        self.storage.upload_analysis_result(filename, &analysis).await?;
        Ok(analysis)
    }
}

/// Transcript turns of a stored call log
pub fn parse_transcript(bytes: &[u8]) -> Result<Vec<TranscriptTurn>, PipelineError> {
    let document: Value =
        serde_json::from_slice(bytes).map_err(|e| PipelineError::InvalidCallLog(e.to_string()))?;

    let transcript = document
        .get("transcript")
        .cloned()
        .ok_or_else(|| PipelineError::InvalidCallLog("missing transcript".to_string()))?;

    let turns: Vec<TranscriptTurn> =
        serde_json::from_value(transcript).map_err(|e| PipelineError::InvalidCallLog(e.to_string()))?;

    if turns.is_empty() {
        return Err(PipelineError::InvalidCallLog("transcript is empty".to_string()));
    }
    Ok(turns)
}
