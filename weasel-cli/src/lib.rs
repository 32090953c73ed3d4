//! weasel-cli - Command-line client for weasel-ai
//!
//! Uploads call logs, triggers analysis and follows files until their
//! analysis settles.

pub mod api_client;
pub mod poller;

pub use api_client::{ApiClient, ClientError, FileRow, ProcessReply, StatusUpdate, UploadReply};
pub use poller::{StatusPoller, StatusSource, TrackedFile, TrackedStatus, DEFAULT_POLL_INTERVAL};
