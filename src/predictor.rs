//! Prediction pipeline: validate, score, bucket, persist.
//!
//! Every failure leaves this module as a [`StrokeError`]; the HTTP layer only
//! has to render it.

use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::{Result, StrokeError};
use crate::model::ClassifierAdapter;
use crate::records::PredictionResult;
use crate::store::ResultStore;
use crate::validation::parse_record;

#[derive(Clone)]
pub struct Predictor {
    classifier: ClassifierAdapter,
    store: ResultStore,
    inference_timeout: Duration,
}

impl Predictor {
    pub fn new(classifier: ClassifierAdapter, store: ResultStore, inference_timeout: Duration) -> Self {
        Predictor {
            classifier,
            store,
            inference_timeout,
        }
    }

    pub fn classifier(&self) -> &ClassifierAdapter {
        &self.classifier
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Entry point for a raw request body.
    pub async fn predict(&self, body: &[u8]) -> Result<PredictionResult> {
        let raw = parse_body(body)?;
        self.predict_record(&raw).await
    }

    pub async fn predict_record(&self, raw: &Map<String, Value>) -> Result<PredictionResult> {
        let record = parse_record(raw).map_err(|errors| {
            log::warn!("Validation errors: {:?}", errors);
            StrokeError::Validation(errors)
        })?;

        if !self.classifier.is_loaded() {
            log::error!("Model not loaded");
            return Err(StrokeError::ModelUnavailable);
        }

        let score = self
            .classifier
            .score_within(record, self.inference_timeout)
            .await?;
        let result = PredictionResult::new(record, score);

        // durable write failures are logged inside the store and never fail the request
        self.store.append(result.clone()).await;

        log::info!(
            "Prediction - Age: {}, Risk: {}",
            result.patient_data.age,
            result.risk_level
        );
        Ok(result)
    }
}

/// Absent bodies and JSON "falsy" values (`null`, `{}`, `[]`, `""`, `0`,
/// `false`) all count as empty.
fn parse_body(body: &[u8]) -> Result<Map<String, Value>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(StrokeError::EmptyBody);
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| StrokeError::InvalidJson(e.to_string()))?;

    let empty = match &value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    };
    if empty {
        return Err(StrokeError::EmptyBody);
    }

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(StrokeError::NotAnObject),
    }
}
