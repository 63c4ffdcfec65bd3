use serde::{Deserialize, Serialize};
use std::fmt;

/// `P(stroke)` at or above this is reported as [`RiskLevel::High`].
///
/// The thresholds are part of the public contract: moving them changes the
/// clinical reading of every response, so they are fixed constants rather
/// than anything fitted to data.
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

/// `P(stroke)` at or above this (and below [`HIGH_RISK_THRESHOLD`]) is
/// reported as [`RiskLevel::Medium`].
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boundary values belong to the higher bucket.
pub fn bucket(p_stroke: f64) -> RiskLevel {
    if p_stroke >= HIGH_RISK_THRESHOLD {
        RiskLevel::High
    } else if p_stroke >= MEDIUM_RISK_THRESHOLD {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}
