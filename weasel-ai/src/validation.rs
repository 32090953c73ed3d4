//! Upload validation
//!
//! Every check runs on the request alone, before storage is touched.

use serde_json::Value;
use thiserror::Error;
use weasel_common::call_log::CallLogSummary;

const BYTES_PER_MB: u64 = 1024 * 1024;
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("No file provided")]
    NoFile,

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Only JSON files are allowed")]
    InvalidType,

    #[error("File size exceeds {max_mb}MB limit")]
    TooLarge { max_mb: u64 },

    #[error("File is empty")]
    Empty,

    #[error("Invalid JSON format")]
    InvalidJson,
}

/// Accepted upload, ready to store
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub summary: CallLogSummary,
}

impl ValidatedUpload {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub fn max_size_bytes(max_file_size_mb: u64) -> u64 {
    max_file_size_mb.saturating_mul(BYTES_PER_MB)
}

/// Filenames are blob names in a flat namespace
fn check_filename(filename: &str) -> Result<(), ValidationError> {
    let trimmed = filename.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::NoFile);
    }
    if trimmed.contains('/') || trimmed.contains('\\') || trimmed == "." || trimmed == ".." {
        return Err(ValidationError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Type, size and emptiness checks (no content inspection)
pub fn validate_file(
    filename: &str,
    content_type: Option<&str>,
    size: u64,
    max_file_size_mb: u64,
) -> Result<(), ValidationError> {
    check_filename(filename)?;

    let is_json_type = content_type
        .map(|t| t.split(';').next().unwrap_or("").trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE))
        .unwrap_or(false);
    if !is_json_type && !filename.to_ascii_lowercase().ends_with(".json") {
        return Err(ValidationError::InvalidType);
    }

    if size > max_size_bytes(max_file_size_mb) {
        return Err(ValidationError::TooLarge {
            max_mb: max_file_size_mb,
        });
    }

    if size == 0 {
        return Err(ValidationError::Empty);
    }

    Ok(())
}

/// Full upload validation: [`validate_file`] then JSON parse
pub fn validate_upload(
    filename: &str,
    content_type: Option<&str>,
    bytes: Vec<u8>,
    max_file_size_mb: u64,
) -> Result<ValidatedUpload, ValidationError> {
    validate_file(filename, content_type, bytes.len() as u64, max_file_size_mb)?;

    let document: Value = serde_json::from_slice(&bytes).map_err(|_| ValidationError::InvalidJson)?;

    Ok(ValidatedUpload {
        filename: filename.trim().to_string(),
        content_type: content_type
            .filter(|t| !t.is_empty())
            .unwrap_or(JSON_CONTENT_TYPE)
            .to_string(),
        summary: CallLogSummary::from_value(&document),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_extension_or_type_required() {
        assert_eq!(
            validate_file("notes.txt", Some("text/plain"), 10, 10),
            Err(ValidationError::InvalidType)
        );
        assert!(validate_file("CALL.JSON", None, 10, 10).is_ok());
        assert!(validate_file("export", Some("application/json; charset=utf-8"), 10, 10).is_ok());
    }

    #[test]
    fn test_size_limits() {
        let max = max_size_bytes(1);
        assert!(validate_file("a.json", None, max, 1).is_ok());
        assert_eq!(
            validate_file("a.json", None, max + 1, 1),
            Err(ValidationError::TooLarge { max_mb: 1 })
        );
        assert_eq!(validate_file("a.json", None, 0, 1), Err(ValidationError::Empty));
    }

    #[test]
    fn test_filename_must_be_flat() {
        assert_eq!(validate_file("", None, 1, 1), Err(ValidationError::NoFile));
        assert!(matches!(
            validate_file("2025/10/14/a.json", None, 1, 1),
            Err(ValidationError::InvalidFilename(_))
        ));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = validate_upload("a.json", None, b"{not json".to_vec(), 10).unwrap_err();
        assert_eq!(err, ValidationError::InvalidJson);
        assert_eq!(err.to_string(), "Invalid JSON format");
    }

    #[test]
    fn test_valid_upload_extracts_summary() {
        let body = br#"{"callId": "CALL-1", "agentName": "Dana", "duration": "01:30", "transcript": []}"#;
        let upload = validate_upload("call.json", Some(""), body.to_vec(), 10).unwrap();
        assert_eq!(upload.content_type, "application/json");
        assert_eq!(upload.size(), body.len() as u64);
        assert_eq!(upload.summary.call_id.as_deref(), Some("CALL-1"));
        assert_eq!(upload.summary.call_duration, Some(90));
    }
}
