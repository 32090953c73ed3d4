//! Service modules for call-log analysis
//!
//! [`LanguageModel`] is the seam between the analysis services and the hosted
//! model; [`AnthropicClient`] is the production implementation.

pub mod anthropic_client;
pub mod compliance;
pub mod evaluation;
pub mod json_repair;

pub use anthropic_client::AnthropicClient;
pub use compliance::{AnalysisError, ComplianceAnalyzer};
pub use evaluation::{EvaluationError, ResponseEvaluator};

use async_trait::async_trait;
use thiserror::Error;

/// Language model client errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("ANTHROPIC_API_KEY is not configured")]
    MissingApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Unexpected response type from model: {0}")]
    UnexpectedContent(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Single-turn completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Hosted language model
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one user message and return the text of the first content block
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}
