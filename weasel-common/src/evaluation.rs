//! Alternative-response evaluation documents
//!
//! A reviewer proposes a rewording for a flagged agent utterance and the model
//! scores the rewording on compliance, professionalism, effectiveness and tone.

use serde::{Deserialize, Serialize};

/// The violation an alternative response is meant to fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationContext {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub regulation: String,
    #[serde(default)]
    pub explanation: String,
}

/// POST /api/evaluate request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateRequest {
    pub original_response: String,
    pub alternative_response: String,
    pub violation_context: ViolationContext,
}

/// Per-dimension scores, each 0-10
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationScores {
    pub fdcpa_compliance: f64,
    pub professionalism: f64,
    pub effectiveness: f64,
    pub tone_empathy: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationRecommendation {
    Approve,
    ApproveWithNotes,
    NeedsRevision,
}

/// Model verdict on an alternative response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub scores: EvaluationScores,
    pub improvements: Vec<String>,
    pub concerns: Vec<String>,
    pub rationale: String,
    pub recommendation: EvaluationRecommendation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recommendation_wire_names() {
        let r: EvaluationRecommendation = serde_json::from_value(json!("approve_with_notes")).unwrap();
        assert_eq!(r, EvaluationRecommendation::ApproveWithNotes);
        assert!(serde_json::from_value::<EvaluationRecommendation>(json!("maybe")).is_err());
    }

    #[test]
    fn test_request_deserializes() {
        let req: EvaluateRequest = serde_json::from_value(json!({
            "originalResponse": "Pay now or else",
            "alternativeResponse": "Can we discuss a plan?",
            "violationContext": {
                "type": "threatening",
                "severity": "high",
                "regulation": "FDCPA Section 806",
                "explanation": "Implied threat"
            }
        }))
        .unwrap();
        assert_eq!(req.violation_context.kind, "threatening");
    }
}
