//! Compliance analysis documents
//!
//! One analysis result is produced per file record and stored as a sibling
//! blob keyed by the same filename in the processed container.

use serde::{Deserialize, Serialize};

/// Severity of a flagged transcript segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Where in the call a violation occurred.
///
/// The model is asked for seconds from start, but stored results written by
/// older tooling carry ISO timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViolationTimestamp {
    Seconds(f64),
    Text(String),
}

/// A transcript segment judged to breach the rubric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// abusive_language, threatening, excessive_pressure, fdcpa_violation, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<ViolationTimestamp>,
    #[serde(default)]
    pub speaker: String,
    #[serde(default)]
    pub quote: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub regulation: String,
    #[serde(default)]
    pub suggested_alternative: String,
}

/// Compliance analysis of a single call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Overall risk, 0 (none) to 10 (highest)
    pub risk_score: f64,
    /// FDCPA compliance, 0 (non-compliant) to 10 (fully compliant)
    pub fdcpa_score: f64,
    pub violations: Vec<Violation>,
    pub summary: String,
    pub recommendations: Vec<String>,
}

impl AnalysisResult {
    /// Highest severity among the violations, if any
    pub fn worst_severity(&self) -> Option<Severity> {
        self.violations.iter().map(|v| v.severity).max_by_key(|s| *s as u8)
    }
}
