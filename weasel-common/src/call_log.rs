//! Call log documents
//!
//! A call log is the uploaded JSON transcript of a debt-collection call. It is
//! immutable once stored and identified by its filename.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Who spoke a transcript turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Agent,
    Customer,
    /// Anything else a transcript producer emits (e.g. "client", "system")
    #[serde(other)]
    Other,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Agent => write!(f, "agent"),
            Speaker::Customer => write!(f, "customer"),
            Speaker::Other => write!(f, "other"),
        }
    }
}

/// One utterance in the call transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    #[serde(default)]
    pub timestamp: String,
    pub text: String,
}

/// Call-log fields copied onto the file record for list views
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLogSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_outcome: Option<String>,
}

impl CallLogSummary {
    /// Extract display fields from arbitrary uploaded JSON.
    ///
    /// Uploads only have to be valid JSON, so every field is optional here;
    /// a document with none of the expected keys yields an empty summary.
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let call_duration = match value.get("duration") {
            Some(Value::Number(n)) => n.as_f64().filter(|s| *s >= 0.0).map(|s| s as u64),
            Some(Value::String(s)) => parse_duration_seconds(s),
            _ => None,
        };

        let call_outcome = value
            .get("metadata")
            .and_then(|m| m.get("callOutcome"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            call_id: text("callId"),
            agent_name: text("agentName"),
            agent_id: text("agentId"),
            call_duration,
            call_timestamp: text("timestamp"),
            call_outcome,
        }
    }
}

/// Render transcript turns as `speaker: text` lines
pub fn format_transcript(turns: &[TranscriptTurn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.speaker, turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse `HH:MM:SS` or `MM:SS` into seconds
pub fn parse_duration_seconds(text: &str) -> Option<u64> {
    let parts: Vec<u64> = text
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<u64>())
        .collect::<Result<_, _>>()
        .ok()?;

    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => (0, *m, *s),
        _ => return None,
    };

    hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "callId": "CLG-2024-10-001",
            "timestamp": "2025-10-10T09:30:00Z",
            "duration": "00:04:32",
            "agentId": "AG-17",
            "agentName": "Dana Reyes",
            "accountNumber": "****1234",
            "transcript": [
                {"speaker": "agent", "timestamp": "00:00:01", "text": "Good morning."},
                {"speaker": "customer", "timestamp": "00:00:04", "text": "Who is this?"}
            ],
            "metadata": {
                "callType": "outbound",
                "accountBalance": 500.0,
                "previousContacts": 2,
                "callOutcome": "payment_plan"
            }
        })
    }

    #[test]
    fn test_parse_duration_formats() {
        assert_eq!(parse_duration_seconds("01:02:03"), Some(3723));
        assert_eq!(parse_duration_seconds("04:32"), Some(272));
        assert_eq!(parse_duration_seconds("272"), None);
        assert_eq!(parse_duration_seconds("aa:bb"), None);
    }

    #[test]
    fn test_parse_duration_overflow_is_none() {
        assert_eq!(parse_duration_seconds("18446744073709551615:00:00"), None);
        assert_eq!(parse_duration_seconds("18446744073709551615:00"), None);
        assert_eq!(parse_duration_seconds("0:0:18446744073709551615"), Some(u64::MAX));
        assert_eq!(parse_duration_seconds("0:1:18446744073709551615"), None);
    }

    #[test]
    fn test_transcript_lines() {
        let turns: Vec<TranscriptTurn> = serde_json::from_value(sample()["transcript"].clone()).unwrap();
        assert_eq!(
            format_transcript(&turns),
            "agent: Good morning.\ncustomer: Who is this?"
        );
    }

    #[test]
    fn test_summary_with_overflowing_duration() {
        let summary = CallLogSummary::from_value(&json!({"callId": "C-9", "duration": "18446744073709551615:00:00"}));
        assert_eq!(summary.call_id.as_deref(), Some("C-9"));
        assert_eq!(summary.call_duration, None);
    }

    #[test]
    fn test_unknown_speaker_is_tolerated() {
        let turn: TranscriptTurn =
            serde_json::from_value(json!({"speaker": "system", "text": "beep"})).unwrap();
        assert_eq!(turn.speaker, Speaker::Other);
    }

    #[test]
    fn test_summary_from_value() {
        let summary = CallLogSummary::from_value(&sample());
        assert_eq!(summary.call_id.as_deref(), Some("CLG-2024-10-001"));
        assert_eq!(summary.agent_name.as_deref(), Some("Dana Reyes"));
        assert_eq!(summary.call_duration, Some(272));
        assert_eq!(summary.call_outcome.as_deref(), Some("payment_plan"));
    }

    #[test]
    fn test_summary_from_unrelated_json_is_empty() {
        let summary = CallLogSummary::from_value(&json!([1, 2, 3]));
        assert_eq!(summary, CallLogSummary::default());
    }

    #[test]
    fn test_summary_numeric_duration() {
        let summary = CallLogSummary::from_value(&json!({"duration": 95}));
        assert_eq!(summary.call_duration, Some(95));
    }
}
