//! FDCPA compliance analysis of call transcripts
//!
//! One prompt per transcript, one model call per attempt. Network failures,
//! unparseable output and wrongly shaped output all count as a failed attempt;
//! attempts are separated by 1s, 2s, 4s (capped at 5s).

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use weasel_common::call_log::{format_transcript, TranscriptTurn};
use weasel_common::AnalysisResult;

use super::json_repair::parse_with_repair;
use super::{CompletionRequest, LanguageModel, LlmError};

pub const ANALYSIS_MAX_TOKENS: u32 = 2048;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

const INITIAL_BACKOFF: Duration = Duration::from_millis(1000);
const MAX_BACKOFF: Duration = Duration::from_millis(5000);

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Failed to parse analysis: {0}")]
    Parse(String),

    #[error("Failed to get compliance analysis after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Prompt embedding the transcript and the scoring rubric
pub fn build_analysis_prompt(transcript: &[TranscriptTurn]) -> String {
    let transcript_text = format_transcript(transcript);

    format!(
        r#"Analyze this debt collection call for FDCPA compliance.

Call Transcript:
{transcript_text}

Evaluate the conversation for:

1. FDCPA Violations
   - Section 806 (Harassment or Abuse)
   - Section 807 (False or Misleading Representations)
   - Section 808 (Unfair Practices)

2. Risk Assessment
   - Overall risk score (0-10, where 10 is highest risk)
   - FDCPA compliance score (0-10, where 10 is fully compliant)

3. Language Analysis
   - Abusive or threatening language
   - Excessive pressure tactics
   - Unprofessional communication

Return analysis in the following JSON structure, and nothing else:
{{
  "riskScore": number,
  "fdcpaScore": number,
  "violations": [
    {{
      "type": "abusive_language" | "threatening" | "excessive_pressure" | "fdcpa_violation",
      "severity": "low" | "medium" | "high" | "critical",
      "timestamp": number (seconds from start),
      "speaker": "agent" | "client",
      "quote": "exact quote from transcript",
      "explanation": "why this is problematic",
      "regulation": "FDCPA Section reference",
      "suggestedAlternative": "better way to phrase this"
    }}
  ],
  "summary": "brief overall assessment",
  "recommendations": ["list of general recommendations"]
}}"#
    )
}

/// Numeric scores, array violations, string summary, array recommendations
pub fn is_analysis_shape(value: &Value) -> bool {
    value.is_object()
        && value["riskScore"].is_number()
        && value["fdcpaScore"].is_number()
        && value["violations"].is_array()
        && value["summary"].is_string()
        && value["recommendations"].is_array()
}

/// Parse model output into an analysis, repairing cosmetic damage if needed
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, AnalysisError> {
    parse_with_repair(text, is_analysis_shape).map_err(AnalysisError::Parse)
}

/// Runs compliance analyses against a language model
#[derive(Clone)]
pub struct ComplianceAnalyzer {
    model: Arc<dyn LanguageModel>,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl ComplianceAnalyzer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }

    /// Override the pause between attempts
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Pause after failed attempt `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }

    /// Analyze a transcript, making at most `max_attempts` model calls
    ///
    /// Returns either a result that passed the shape check or
    /// [`AnalysisError::Exhausted`] carrying the last failure.
    pub async fn get_compliance_analysis(
        &self,
        transcript: &[TranscriptTurn],
        max_attempts: u32,
    ) -> Result<AnalysisResult, AnalysisError> {
        let max_attempts = max_attempts.max(1);
        let request = CompletionRequest::new(build_analysis_prompt(transcript), ANALYSIS_MAX_TOKENS);

        tracing::info!(turns = transcript.len(), max_attempts, "Starting compliance analysis");

        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let result = match self.model.complete(&request).await {
                Ok(text) => {
                    tracing::debug!(attempt, response_chars = text.len(), "Model response received");
                    parse_analysis(&text)
                }
                Err(e) => Err(AnalysisError::Llm(e)),
            };

            match result {
                Ok(analysis) => {
                    tracing::info!(
                        attempt,
                        risk_score = analysis.risk_score,
                        fdcpa_score = analysis.fdcpa_score,
                        violations = analysis.violations.len(),
                        "Compliance analysis succeeded"
                    );
                    return Ok(analysis);
                }
                Err(e) => {
                    tracing::warn!(attempt, max_attempts, error = %e, "Compliance analysis attempt failed");
                    last_error = e.to_string();
                }
            }

            if attempt < max_attempts {
                let delay = self.backoff_for(attempt);
                tracing::debug!(delay_ms = delay.as_millis() as u64, "Retrying compliance analysis");
                tokio::time::sleep(delay).await;
            }
        }

        tracing::error!(attempts = max_attempts, error = %last_error, "All analysis attempts exhausted");
        Err(AnalysisError::Exhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}
