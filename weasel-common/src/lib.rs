//! # Weasel Common Library
//!
//! Shared code for the Weasel call-log compliance services including:
//! - Call log, analysis and evaluation documents
//! - File record metadata and its string-map storage encoding
//! - Risk levels and portfolio analytics
//! - Bootstrap configuration loading
//! - Common error type

pub mod analysis;
pub mod evaluation;
pub mod call_log;
pub mod config;
pub mod error;
pub mod metadata;
pub mod risk;
pub mod time;

pub use analysis::{AnalysisResult, Severity, Violation};
pub use call_log::{CallLogSummary, TranscriptTurn};
pub use error::{Error, Result};
pub use metadata::{FileMetadata, FileStatus, MetadataPatch};
pub use risk::RiskLevel;
