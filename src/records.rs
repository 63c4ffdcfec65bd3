use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Score;
use crate::risk::{bucket, RiskLevel};

/// Numeric type a raw field must coerce to before its range is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Float,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Float => "float",
        }
    }
}

/// One entry of the validation rule table. Bounds are inclusive.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub min: f64,
    pub max: f64,
}

impl FieldRule {
    const fn new(name: &'static str, kind: FieldKind, min: f64, max: f64) -> Self {
        FieldRule {
            name,
            kind,
            min,
            max,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Declared order matters twice: validation errors are reported in this
/// order, and it is the feature order the frozen model was trained on.
pub const VALIDATION_RULES: [FieldRule; 6] = [
    FieldRule::new("age", FieldKind::Int, 18.0, 120.0),
    FieldRule::new("hypertension", FieldKind::Int, 0.0, 1.0),
    FieldRule::new("heart_disease", FieldKind::Int, 0.0, 1.0),
    FieldRule::new("avg_glucose_level", FieldKind::Float, 50.0, 300.0),
    FieldRule::new("bmi", FieldKind::Float, 10.0, 50.0),
    FieldRule::new("smoking_status", FieldKind::Int, 0.0, 3.0),
];

pub const FEATURE_COUNT: usize = VALIDATION_RULES.len();

pub fn feature_names() -> Vec<&'static str> {
    VALIDATION_RULES.iter().map(|rule| rule.name).collect()
}

/// The six clinical inputs, already coerced and range checked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub age: i64,
    pub hypertension: i64,
    pub heart_disease: i64,
    pub avg_glucose_level: f64,
    pub bmi: f64,
    pub smoking_status: i64,
}

impl PatientRecord {
    /// Projection fed to the classifier:
    /// `[age, hypertension, heart_disease, avg_glucose_level, bmi, smoking_status]`.
    pub fn features(&self) -> [f64; FEATURE_COUNT] {
        [
            self.age as f64,
            self.hypertension as f64,
            self.heart_disease as f64,
            self.avg_glucose_level,
            self.bmi,
            self.smoking_status as f64,
        ]
    }
}

/// One scored request. Created once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub timestamp: DateTime<Utc>,
    pub patient_data: PatientRecord,
    pub prediction: u8,
    pub stroke_probability: f64,
    pub no_stroke_probability: f64,
    pub risk_level: RiskLevel,
    pub confidence: f64,
}

impl PredictionResult {
    pub fn new(patient_data: PatientRecord, score: Score) -> Self {
        let stroke_probability = score.p_stroke();
        let no_stroke_probability = score.p_no_stroke();
        PredictionResult {
            timestamp: Utc::now(),
            patient_data,
            prediction: score.label,
            stroke_probability,
            no_stroke_probability,
            risk_level: bucket(stroke_probability),
            confidence: stroke_probability.max(no_stroke_probability),
        }
    }
}
