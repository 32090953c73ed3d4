//! Scoring of reviewer-proposed alternative agent responses

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use weasel_common::evaluation::{EvaluateRequest, EvaluationResult};

use super::json_repair::parse_with_repair;
use super::{CompletionRequest, LanguageModel, LlmError};

pub const EVALUATION_MAX_TOKENS: u32 = 2000;
pub const EVALUATION_TEMPERATURE: f32 = 0.3;

const RECOMMENDATIONS: [&str; 3] = ["approve", "approve_with_notes", "needs_revision"];

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Failed to parse evaluation: {0}")]
    InvalidResponse(String),
}

/// Reject requests with nothing to evaluate
pub fn validate_request(request: &EvaluateRequest) -> Result<(), EvaluationError> {
    if request.original_response.is_empty() || request.violation_context.kind.is_empty() {
        return Err(EvaluationError::InvalidRequest(
            "Missing required fields: originalResponse, alternativeResponse, or violationContext".to_string(),
        ));
    }
    if request.alternative_response.trim().is_empty() {
        return Err(EvaluationError::InvalidRequest(
            "Alternative response cannot be empty".to_string(),
        ));
    }
    Ok(())
}

pub fn build_evaluation_prompt(request: &EvaluateRequest) -> String {
    let context = &request.violation_context;

    format!(
        r#"Evaluate this alternative collection agent response for quality and compliance.

Context:
- Original Response: "{original}"
- Violation Type: {kind}
- FDCPA Issue: {explanation}
- Regulation: {regulation}

Alternative Response:
"{alternative}"

Evaluate the alternative response on these dimensions (0-10 scale):

1. FDCPA Compliance
   - Does it avoid all regulatory violations?
   - Is it free of harassment, threats, or false representations?

2. Professionalism
   - Is the tone respectful and appropriate?
   - Does it maintain professional standards?

3. Effectiveness
   - Does it advance the collection goal appropriately?
   - Does it maintain communication without being aggressive?

4. Tone & Empathy
   - Does it show understanding of the consumer's situation?
   - Is the language constructive rather than confrontational?

Return evaluation in this JSON structure, and nothing else:
{{
  "scores": {{
    "fdcpaCompliance": number (0-10),
    "professionalism": number (0-10),
    "effectiveness": number (0-10),
    "toneEmpathy": number (0-10),
    "overall": number (0-10)
  }},
  "improvements": [
    "List specific improvements over original"
  ],
  "concerns": [
    "List any remaining issues or areas for improvement"
  ],
  "rationale": "Detailed explanation of the evaluation",
  "recommendation": "approve" | "approve_with_notes" | "needs_revision"
}}"#,
        original = request.original_response,
        kind = context.kind,
        explanation = context.explanation,
        regulation = context.regulation,
        alternative = request.alternative_response,
    )
}

pub fn is_evaluation_shape(value: &Value) -> bool {
    let scores = &value["scores"];
    ["fdcpaCompliance", "professionalism", "effectiveness", "toneEmpathy", "overall"]
        .iter()
        .all(|k| scores[*k].is_number())
        && value["improvements"].is_array()
        && value["concerns"].is_array()
        && value["rationale"].is_string()
        && value["recommendation"]
            .as_str()
            .map(|r| RECOMMENDATIONS.contains(&r))
            .unwrap_or(false)
}

/// Evaluates alternative responses with a single model call
#[derive(Clone)]
pub struct ResponseEvaluator {
    model: Arc<dyn LanguageModel>,
}

impl ResponseEvaluator {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn evaluate(&self, request: &EvaluateRequest) -> Result<EvaluationResult, EvaluationError> {
        validate_request(request)?;

        tracing::info!(
            original_chars = request.original_response.len(),
            alternative_chars = request.alternative_response.len(),
            "Evaluating alternative response"
        );

        let completion = CompletionRequest::new(build_evaluation_prompt(request), EVALUATION_MAX_TOKENS)
            .with_temperature(EVALUATION_TEMPERATURE);
        let text = self.model.complete(&completion).await?;

        let result: EvaluationResult =
            parse_with_repair(&text, is_evaluation_shape).map_err(EvaluationError::InvalidResponse)?;

        tracing::info!(
            overall = result.scores.overall,
            recommendation = ?result.recommendation,
            "Evaluation complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use weasel_common::evaluation::{EvaluationRecommendation, ViolationContext};

    struct FixedModel {
        reply: String,
        seen: Mutex<Option<CompletionRequest>>,
    }

    #[async_trait]
    impl LanguageModel for FixedModel {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
            *self.seen.lock().unwrap() = Some(request.clone());
            Ok(self.reply.clone())
        }
    }

    fn request(alternative: &str) -> EvaluateRequest {
        EvaluateRequest {
            original_response: "Pay now or we'll take your house.".into(),
            alternative_response: alternative.into(),
            violation_context: ViolationContext {
                kind: "threatening".into(),
                severity: "high".into(),
                regulation: "FDCPA Section 807(5)".into(),
                explanation: "Threatens action not intended".into(),
            },
        }
    }

    fn model(reply: &str) -> Arc<FixedModel> {
        Arc::new(FixedModel {
            reply: reply.into(),
            seen: Mutex::new(None),
        })
    }

    const REPLY: &str = r#"{
        "scores": {"fdcpaCompliance": 9, "professionalism": 8, "effectiveness": 7, "toneEmpathy": 8, "overall": 8},
        "improvements": ["Removes the threat"],
        "concerns": [],
        "rationale": "Compliant and courteous",
        "recommendation": "approve_with_notes"
    }"#;

    #[tokio::test]
    async fn test_evaluate_uses_low_temperature() {
        let model = model(REPLY);
        let evaluator = ResponseEvaluator::new(model.clone());

        let result = evaluator
            .evaluate(&request("Could we set up a payment plan that works for you?"))
            .await
            .unwrap();

        assert_eq!(result.recommendation, EvaluationRecommendation::ApproveWithNotes);
        assert_eq!(result.scores.overall, 8.0);

        let seen = model.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.temperature, Some(0.3));
        assert_eq!(seen.max_tokens, 2000);
        assert!(seen.prompt.contains("- Violation Type: threatening"));
    }

    #[tokio::test]
    async fn test_blank_alternative_rejected_before_model_call() {
        let model = model(REPLY);
        let evaluator = ResponseEvaluator::new(model.clone());

        let err = evaluator.evaluate(&request("   ")).await.unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidRequest(_)));
        assert!(model.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_recommendation_is_invalid() {
        let evaluator = ResponseEvaluator::new(model(&REPLY.replace("approve_with_notes", "maybe")));
        let err = evaluator.evaluate(&request("Better wording")).await.unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidResponse(_)));
    }
}
