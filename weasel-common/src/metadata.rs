//! File record metadata
//!
//! Blob metadata can only hold string values, so the typed [`FileMetadata`] is
//! converted to and from a flat string map at the storage boundary. Keys are
//! written lower-case; on read every key is lower-cased before lookup so that
//! records written with mixed-case keys still decode.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::call_log::CallLogSummary;
use crate::time::now_rfc3339;
use crate::Error;

/// Flat string map as stored on a blob
pub type RawMetadata = BTreeMap<String, String>;

/// Processing status of a stored call log
///
/// Progresses `uploaded → processing → analyzed | error`. A re-analysis starts a
/// new cycle at `processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Uploaded,
    Processing,
    Analyzed,
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Uploaded => "uploaded",
            FileStatus::Processing => "processing",
            FileStatus::Analyzed => "analyzed",
            FileStatus::Error => "error",
        }
    }

    /// Analysis finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Analyzed | FileStatus::Error)
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uploaded" => Ok(FileStatus::Uploaded),
            "processing" => Ok(FileStatus::Processing),
            "analyzed" => Ok(FileStatus::Analyzed),
            "error" => Ok(FileStatus::Error),
            other => Err(Error::InvalidInput(format!("Unknown file status: {}", other))),
        }
    }
}

/// Typed view of a file record's blob metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub original_filename: String,
    pub uploaded_at: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader_id: Option<String>,
    pub status: FileStatus,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Call duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
}

impl Default for FileMetadata {
    fn default() -> Self {
        Self {
            original_filename: "unknown".to_string(),
            uploaded_at: now_rfc3339(),
            size: 0,
            uploader_id: None,
            status: FileStatus::Uploaded,
            content_type: "application/json".to_string(),
            processing_started_at: None,
            processing_completed_at: None,
            error_message: None,
            call_id: None,
            agent_name: None,
            agent_id: None,
            call_duration: None,
            call_timestamp: None,
            call_outcome: None,
            risk_score: None,
        }
    }
}

impl FileMetadata {
    /// Initial record for a fresh upload
    pub fn for_upload(filename: &str, size: u64, content_type: &str, summary: &CallLogSummary) -> Self {
        Self {
            original_filename: filename.to_string(),
            size,
            content_type: content_type.to_string(),
            call_id: summary.call_id.clone(),
            agent_name: summary.agent_name.clone(),
            agent_id: summary.agent_id.clone(),
            call_duration: summary.call_duration,
            call_timestamp: summary.call_timestamp.clone(),
            call_outcome: summary.call_outcome.clone(),
            ..Self::default()
        }
    }

    /// Overlay every field set in `patch`
    pub fn apply(&mut self, patch: &MetadataPatch) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
        // An empty string clears an optional text field, same as an empty
        // value in the stored map.
        fn set_opt(target: &mut Option<String>, value: &Option<String>) {
            if let Some(v) = value {
                *target = if v.is_empty() { None } else { Some(v.clone()) };
            }
        }

        set(&mut self.original_filename, &patch.original_filename);
        set(&mut self.uploaded_at, &patch.uploaded_at);
        set(&mut self.size, &patch.size);
        set_opt(&mut self.uploader_id, &patch.uploader_id);
        set(&mut self.status, &patch.status);
        set(&mut self.content_type, &patch.content_type);
        set_opt(&mut self.processing_started_at, &patch.processing_started_at);
        set_opt(&mut self.processing_completed_at, &patch.processing_completed_at);
        set_opt(&mut self.error_message, &patch.error_message);
        set_opt(&mut self.call_id, &patch.call_id);
        set_opt(&mut self.agent_name, &patch.agent_name);
        set_opt(&mut self.agent_id, &patch.agent_id);
        if patch.call_duration.is_some() {
            self.call_duration = patch.call_duration;
        }
        set_opt(&mut self.call_timestamp, &patch.call_timestamp);
        set_opt(&mut self.call_outcome, &patch.call_outcome);
        if patch.risk_score.is_some() {
            self.risk_score = patch.risk_score;
        }
    }
}

/// Partial update of a file record; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataPatch {
    pub original_filename: Option<String>,
    pub uploaded_at: Option<String>,
    pub size: Option<u64>,
    pub uploader_id: Option<String>,
    pub status: Option<FileStatus>,
    pub content_type: Option<String>,
    pub processing_started_at: Option<String>,
    pub processing_completed_at: Option<String>,
    pub error_message: Option<String>,
    pub call_id: Option<String>,
    pub agent_name: Option<String>,
    pub agent_id: Option<String>,
    pub call_duration: Option<u64>,
    pub call_timestamp: Option<String>,
    pub call_outcome: Option<String>,
    pub risk_score: Option<f64>,
}

impl MetadataPatch {
    /// Patch that only changes the status
    pub fn status(status: FileStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Encode metadata as the flat lower-case string map blobs carry
pub fn serialize_metadata(metadata: &FileMetadata) -> RawMetadata {
    fn text(value: &Option<String>) -> String {
        value.clone().unwrap_or_default()
    }

    let mut map = RawMetadata::new();
    map.insert("originalfilename".into(), non_empty(&metadata.original_filename, "unknown"));
    map.insert("uploadedat".into(), metadata.uploaded_at.clone());
    map.insert("size".into(), metadata.size.to_string());
    map.insert("uploaderid".into(), text(&metadata.uploader_id));
    map.insert("status".into(), metadata.status.as_str().to_string());
    map.insert("contenttype".into(), non_empty(&metadata.content_type, "application/json"));
    map.insert("processingstartedat".into(), text(&metadata.processing_started_at));
    map.insert("processingcompletedat".into(), text(&metadata.processing_completed_at));
    map.insert("errormessage".into(), text(&metadata.error_message));
    map.insert("callid".into(), text(&metadata.call_id));
    map.insert("agentname".into(), text(&metadata.agent_name));
    map.insert("agentid".into(), text(&metadata.agent_id));
    map.insert(
        "callduration".into(),
        metadata.call_duration.map(|d| d.to_string()).unwrap_or_default(),
    );
    map.insert("calltimestamp".into(), text(&metadata.call_timestamp));
    map.insert("calloutcome".into(), text(&metadata.call_outcome));
    map.insert(
        "riskscore".into(),
        metadata.risk_score.map(|r| r.to_string()).unwrap_or_default(),
    );
    map
}

/// Decode a stored string map, tolerating key-case drift and bad numbers
pub fn deserialize_metadata<'a, I>(raw: I) -> FileMetadata
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let normalized: BTreeMap<String, &str> = raw
        .into_iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
        .collect();

    let get = |key: &str| -> Option<String> {
        normalized
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let defaults = FileMetadata::default();

    FileMetadata {
        original_filename: get("originalfilename").unwrap_or(defaults.original_filename),
        uploaded_at: get("uploadedat").unwrap_or(defaults.uploaded_at),
        size: get("size").and_then(|s| s.parse().ok()).unwrap_or(0),
        uploader_id: get("uploaderid"),
        status: get("status")
            .and_then(|s| s.parse().ok())
            .unwrap_or(FileStatus::Uploaded),
        content_type: get("contenttype").unwrap_or(defaults.content_type),
        processing_started_at: get("processingstartedat"),
        processing_completed_at: get("processingcompletedat"),
        error_message: get("errormessage"),
        call_id: get("callid"),
        agent_name: get("agentname"),
        agent_id: get("agentid"),
        call_duration: get("callduration").and_then(|s| s.parse().ok()),
        call_timestamp: get("calltimestamp"),
        call_outcome: get("calloutcome"),
        risk_score: get("riskscore").and_then(|s| s.parse::<f64>().ok()).filter(|r| r.is_finite()),
    }
}

fn non_empty(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
