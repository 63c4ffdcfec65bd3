use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::records::PredictionResult;
use crate::risk::RiskLevel;
use crate::store::HistoryLog;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSummary {
    pub total_predictions: usize,
    pub risk_distribution: RiskDistribution,
    pub average_age: f64,
    pub timestamp: DateTime<Utc>,
}

/// Serialized as `{}` under the `stats` key of an empty report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoStats {}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatsReport {
    Empty {
        total_predictions: usize,
        stats: NoStats,
    },
    Summary(StatsSummary),
}

impl StatsReport {
    pub fn total_predictions(&self) -> usize {
        match self {
            StatsReport::Empty {
                total_predictions, ..
            } => *total_predictions,
            StatsReport::Summary(summary) => summary.total_predictions,
        }
    }
}

/// Computed fresh on every call; the log is small and only grows or is
/// cleared wholesale.
pub fn summarize(entries: &[PredictionResult]) -> StatsReport {
    if entries.is_empty() {
        return StatsReport::Empty {
            total_predictions: 0,
            stats: NoStats {},
        };
    }

    let mut distribution = RiskDistribution::default();
    let mut age_sum = 0.0;
    for entry in entries {
        match entry.risk_level {
            RiskLevel::High => distribution.high += 1,
            RiskLevel::Medium => distribution.medium += 1,
            RiskLevel::Low => distribution.low += 1,
        }
        age_sum += entry.patient_data.age as f64;
    }

    StatsReport::Summary(StatsSummary {
        total_predictions: entries.len(),
        risk_distribution: distribution,
        average_age: age_sum / entries.len() as f64,
        timestamp: Utc::now(),
    })
}

/// Scans the current log under a single read lock.
pub async fn stats(history: &HistoryLog) -> StatsReport {
    let entries = history.read().await;
    summarize(&entries)
}
