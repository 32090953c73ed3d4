//! Anthropic Messages API client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CompletionRequest, LanguageModel, LlmError};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const USER_AGENT: &str = concat!("weasel-ai/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Anthropic API client
///
/// Constructed without a key the client still builds, so the service can
/// start and accept uploads; every completion then fails with
/// [`LlmError::MissingApiKey`].
pub struct AnthropicClient {
    http_client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: Option<String>, model: String, base_url: String) -> Result<Self, LlmError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model,
            base_url,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        };

        tracing::debug!(
            model = %self.model,
            prompt_chars = request.prompt.len(),
            "Sending request to Anthropic API"
        );

        let response = self
            .http_client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(status.as_u16(), text));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                model = %parsed.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Anthropic response received"
            );
        }

        match parsed.content.into_iter().next() {
            Some(ContentBlock::Text { text }) => Ok(text),
            Some(ContentBlock::Other) => Err(LlmError::UnexpectedContent("non-text block".to_string())),
            None => Err(LlmError::UnexpectedContent("empty content".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    /// Serve `router` on an ephemeral port and return its base URL
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let client = AnthropicClient::new(
            Some("  ".into()),
            "claude-3-haiku-20240307".into(),
            "http://127.0.0.1:9".into(),
        )
        .unwrap();
        assert!(!client.has_api_key());
        assert_eq!(client.model(), "claude-3-haiku-20240307");

        let err = client.complete(&CompletionRequest::new("hi", 10)).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_sends_headers_and_returns_first_text_block() {
        let router = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["x-api-key"], "sk-test");
                assert_eq!(headers["anthropic-version"], "2023-06-01");
                assert_eq!(body["model"], "claude-3-haiku-20240307");
                assert_eq!(body["max_tokens"], 2048);
                assert_eq!(body["messages"][0]["role"], "user");
                assert!(body.get("temperature").is_none());
                Json(json!({
                    "model": "claude-3-haiku-20240307",
                    "content": [{"type": "text", "text": "{\"ok\":true}"}],
                    "usage": {"input_tokens": 12, "output_tokens": 5}
                }))
            }),
        );
        let base = serve(router).await;

        let client =
            AnthropicClient::new(Some("sk-test".into()), "claude-3-haiku-20240307".into(), format!("{}/", base))
                .unwrap();
        let text = client.complete(&CompletionRequest::new("analyze", 2048)).await.unwrap();
        assert_eq!(text, "{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_non_text_block_is_unexpected() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async {
                Json(json!({
                    "content": [{"type": "tool_use", "id": "x", "name": "t", "input": {}}]
                }))
            }),
        );
        let base = serve(router).await;

        let client = AnthropicClient::new(Some("sk".into()), "m".into(), base).unwrap();
        let err = client.complete(&CompletionRequest::new("x", 10)).await.unwrap_err();
        assert!(matches!(err, LlmError::UnexpectedContent(_)));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
        );
        let base = serve(router).await;

        let client = AnthropicClient::new(Some("sk".into()), "m".into(), base).unwrap();
        match client.complete(&CompletionRequest::new("x", 10)).await {
            Err(LlmError::Api(429, body)) => assert_eq!(body, "rate limited"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
