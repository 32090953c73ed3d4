//! Risk levels and portfolio analytics

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::metadata::{FileMetadata, FileStatus};
use crate::time::parse_rfc3339;

/// Display risk band for a single call's risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: Option<f64>) -> Self {
        match score {
            None => RiskLevel::None,
            Some(s) if s >= 8.0 => RiskLevel::Critical,
            Some(s) if s >= 6.0 => RiskLevel::High,
            Some(s) if s >= 3.0 => RiskLevel::Medium,
            Some(_) => RiskLevel::Low,
        }
    }
}

/// Portfolio-level thresholds (coarser than [`RiskLevel`])
const PORTFOLIO_CRITICAL: f64 = 7.0;
const PORTFOLIO_HIGH: f64 = 5.0;
const PORTFOLIO_MEDIUM: f64 = 3.0;

const TIMELINE_WEEKS: i64 = 8;
const RECENT_ALERTS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskDistribution {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl RiskDistribution {
    fn add(&mut self, score: f64) {
        if score >= PORTFOLIO_CRITICAL {
            self.critical += 1;
        } else if score >= PORTFOLIO_HIGH {
            self.high += 1;
        } else if score >= PORTFOLIO_MEDIUM {
            self.medium += 1;
        } else {
            self.low += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyRisk {
    pub week_start: DateTime<Utc>,
    #[serde(flatten)]
    pub distribution: RiskDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighRiskAlert {
    pub filename: String,
    pub risk_score: f64,
    pub uploaded_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
}

/// Aggregate view over every analyzed call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummary {
    pub total_calls: usize,
    pub average_risk: f64,
    pub high_risk_calls: usize,
    pub distribution: RiskDistribution,
    pub weekly: Vec<WeeklyRisk>,
    pub recent_high_risk: Vec<HighRiskAlert>,
}

impl PortfolioSummary {
    /// Build from `(filename, metadata)` pairs; only analyzed records with a
    /// risk score count.
    pub fn from_records<'a, I>(records: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a FileMetadata)>,
    {
        let analyzed: Vec<(&str, &FileMetadata, f64)> = records
            .into_iter()
            .filter(|(_, m)| m.status == FileStatus::Analyzed)
            .filter_map(|(name, m)| m.risk_score.map(|r| (name, m, r)))
            .collect();

        let total_calls = analyzed.len();
        let average_risk = if total_calls > 0 {
            analyzed.iter().map(|(_, _, r)| r).sum::<f64>() / total_calls as f64
        } else {
            0.0
        };

        let mut distribution = RiskDistribution::default();
        for (_, _, r) in &analyzed {
            distribution.add(*r);
        }

        let first_week = now - Duration::weeks(TIMELINE_WEEKS);
        let mut weekly: Vec<WeeklyRisk> = (0..TIMELINE_WEEKS)
            .map(|i| WeeklyRisk {
                week_start: first_week + Duration::weeks(i),
                distribution: RiskDistribution::default(),
            })
            .collect();
        for (_, meta, r) in &analyzed {
            let Some(uploaded) = parse_rfc3339(&meta.uploaded_at) else {
                continue;
            };
            if uploaded < first_week || uploaded > now {
                continue;
            }
            let index = ((uploaded - first_week).num_days() / 7).clamp(0, TIMELINE_WEEKS - 1);
            weekly[index as usize].distribution.add(*r);
        }

        let mut recent_high_risk: Vec<HighRiskAlert> = analyzed
            .iter()
            .filter(|(_, _, r)| *r >= PORTFOLIO_CRITICAL)
            .map(|(name, meta, r)| HighRiskAlert {
                filename: name.to_string(),
                risk_score: *r,
                uploaded_at: meta.uploaded_at.clone(),
                agent_name: meta.agent_name.clone(),
            })
            .collect();
        recent_high_risk.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        recent_high_risk.truncate(RECENT_ALERTS);

        Self {
            total_calls,
            average_risk,
            high_risk_calls: distribution.critical,
            distribution,
            weekly,
            recent_high_risk,
        }
    }
}
