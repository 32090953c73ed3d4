//! Test Helper Utilities
//!
//! In-memory blob store, a scripted language model and request builders
//! shared by the weasel-ai integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use weasel_ai::pipeline::Pipeline;
use weasel_ai::services::{
    CompletionRequest, ComplianceAnalyzer, LanguageModel, LlmError, ResponseEvaluator,
};
use weasel_ai::storage::{Containers, SqliteBlobStore, StorageClient};
use weasel_ai::utils::RetryPolicy;
use weasel_ai::AppState;

pub const STANDARD_CALL: &str = include_str!("../fixtures/standard-call.json");
pub const STANDARD_ANALYSIS: &str = include_str!("../fixtures/standard-analysis.json");

const BOUNDARY: &str = "weasel-test-boundary";

/// Language model that replays queued replies, then a default reply
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    default_reply: String,
    delay: Duration,
    calls: AtomicU32,
}

impl ScriptedModel {
    /// Always answers with the standard analysis
    pub fn standard() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    /// Standard analysis after `delay`, to hold a run open
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: STANDARD_ANALYSIS.to_string(),
            delay,
            calls: AtomicU32::new(0),
        })
    }

    /// Replays `replies` in order, then the standard analysis
    pub fn scripted(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            default_reply: STANDARD_ANALYSIS.to_string(),
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(self.default_reply.clone()))
    }
}

/// Storage client over a fresh in-memory store with containers created
pub async fn test_storage() -> StorageClient {
    let store = SqliteBlobStore::in_memory().await.unwrap();
    let storage = StorageClient::new(Arc::new(store), Containers::default()).with_retry_policy(RetryPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        ..RetryPolicy::blob()
    });
    storage.initialize_containers().await.unwrap();
    storage
}

/// Pipeline with millisecond analysis backoff
pub fn test_pipeline(storage: &StorageClient, model: Arc<ScriptedModel>) -> Pipeline {
    let analyzer =
        ComplianceAnalyzer::new(model).with_backoff(Duration::from_millis(1), Duration::from_millis(2));
    Pipeline::new(storage.clone(), analyzer)
}

/// App state with a 1 MB upload limit
pub async fn test_app_state(model: Arc<ScriptedModel>) -> AppState {
    let storage = test_storage().await;
    let pipeline = test_pipeline(&storage, model.clone());
    AppState::new(storage, pipeline, ResponseEvaluator::new(model), 1)
}

/// Multipart form with a single `file` part
pub fn multipart_upload(uri: &str, filename: &str, content_type: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            filename, content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
