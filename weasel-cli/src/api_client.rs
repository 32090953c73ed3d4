//! HTTP client for the weasel-ai service

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use weasel_common::metadata::FileStatus;
use weasel_common::AnalysisResult;

const USER_AGENT: &str = concat!("weasel-cli/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{0} already exists on the server (use --replace to overwrite)")]
    Collision(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Network(err.to_string())
    }
}

/// File record as returned by the upload endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub name: String,
    pub size: u64,
    pub uploaded_at: String,
    pub status: FileStatus,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReply {
    pub file: UploadedFile,
    #[serde(default)]
    pub backup_filename: Option<String>,
}

/// Row of the file list
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRow {
    pub name: String,
    pub size: u64,
    pub uploaded_at: String,
    pub status: FileStatus,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListReply {
    files: Vec<FileRow>,
}

/// One entry of a status poll
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub name: String,
    pub status: FileStatus,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    updates: Vec<StatusUpdate>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReply {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub status: Option<FileStatus>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// weasel-ai API client
#[derive(Clone)]
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Upload a call log; `replace` backs up and overwrites an existing file
    pub async fn upload(&self, path: &Path, replace: bool) -> Result<UploadReply, ClientError> {
        let content = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let part = Part::bytes(content)
            .file_name(filename.clone())
            .mime_str("application/json")?;
        let form = Form::new().part("file", part);

        let endpoint = if replace { "/api/upload/replace" } else { "/api/upload" };
        tracing::debug!(filename = %filename, endpoint, "Uploading call log");

        let response = self.http_client.post(self.url(endpoint)).multipart(form).send().await?;

        if response.status() == reqwest::StatusCode::CONFLICT && !replace {
            return Err(ClientError::Collision(filename));
        }
        decode(response).await
    }

    pub async fn process(&self, filename: &str, wait: bool) -> Result<ProcessReply, ClientError> {
        let url = self.url(&format!("/api/process/{}", encode_segment(filename)));
        let request = self.http_client.post(url);
        let request = if wait { request.query(&[("wait", "true")]) } else { request };
        decode(request.send().await?).await
    }

    pub async fn status(&self, names: &[String]) -> Result<Vec<StatusUpdate>, ClientError> {
        let response = self
            .http_client
            .post(self.url("/api/files/status"))
            .json(&json!({ "fileNames": names }))
            .send()
            .await?;
        let reply: StatusReply = decode(response).await?;
        Ok(reply.updates)
    }

    pub async fn list(&self, status: Option<FileStatus>) -> Result<Vec<FileRow>, ClientError> {
        let mut request = self.http_client.get(self.url("/api/files"));
        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }
        let reply: ListReply = decode(request.send().await?).await?;
        Ok(reply.files)
    }

    pub async fn delete(&self, filename: &str) -> Result<(), ClientError> {
        let url = self.url(&format!("/api/files/{}", encode_segment(filename)));
        let _: Value = decode(self.http_client.delete(url).send().await?).await?;
        Ok(())
    }

    pub async fn analysis(&self, filename: &str) -> Result<AnalysisResult, ClientError> {
        let url = self.url(&format!("/api/analysis/{}", encode_segment(filename)));
        decode(self.http_client.get(url).send().await?).await
    }
}

/// Percent-encode a filename for use as one path segment
fn encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => encoded.push(byte as char),
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}

/// Decode a success body, or turn an error body into [`ClientError::Api`]
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v["error"]["message"]
                    .as_str()
                    .or_else(|| v["error"].as_str())
                    .map(str::to_string)
            })
            .unwrap_or(body);
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| ClientError::Parse(e.to_string()))
}
