use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::json;
use std::any::Any;
use std::sync::Arc;

use super::routes::AppState;
use crate::error::StrokeError;
use crate::model::ModelInfo;
use crate::records::{FieldKind, FieldRule, PredictionResult, VALIDATION_RULES};
use crate::stats::{self, StatsReport};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub model_status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let model_status = if state.predictor.classifier().is_loaded() {
        "loaded"
    } else {
        "not_loaded"
    };
    Json(HealthResponse {
        status: "healthy",
        message: "Stroke Detection API is running",
        model_status,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// The body is taken raw so that empty and malformed payloads get their own
/// messages instead of the extractor's rejection.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PredictionResult>, StrokeError> {
    let result = state.predictor.predict(&body).await?;
    Ok(Json(result))
}

/// Rule table keyed by field name, in declared order.
pub struct RuleTable<'a>(pub &'a [FieldRule]);

impl Serialize for RuleTable<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for rule in self.0 {
            let entry = match rule.kind {
                FieldKind::Int => json!({
                    "min": rule.min as i64,
                    "max": rule.max as i64,
                    "type": rule.kind.name(),
                }),
                FieldKind::Float => json!({
                    "min": rule.min,
                    "max": rule.max,
                    "type": rule.kind.name(),
                }),
            };
            map.serialize_entry(rule.name, &entry)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
pub struct ModelInfoResponse<'a> {
    pub model: &'a ModelInfo,
    pub model_loaded: bool,
    pub features: &'a [&'static str],
    pub validation_rules: RuleTable<'static>,
}

pub async fn model_info(State(state): State<Arc<AppState>>) -> Response {
    let classifier = state.predictor.classifier();
    let info = classifier.info();
    Json(ModelInfoResponse {
        model: info,
        model_loaded: classifier.is_loaded(),
        features: &info.features,
        validation_rules: RuleTable(&VALIDATION_RULES),
    })
    .into_response()
}

/// Raw query values; anything that is not an integer falls back to the
/// default, negatives clamp to zero and integers too large for `usize`
/// saturate. Repeated keys keep their first value.
#[derive(Debug, Default)]
pub struct HistoryQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl HistoryQuery {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = HistoryQuery::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "limit" => &mut query.limit,
                "offset" => &mut query.offset,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }

    fn parse(raw: Option<&str>, default: usize) -> usize {
        let Some(raw) = raw.map(str::trim) else {
            return default;
        };
        let (negative, digits) = match raw.as_bytes().first() {
            Some(b'-') => (true, &raw[1..]),
            Some(b'+') => (false, &raw[1..]),
            _ => (false, raw),
        };
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return default;
        }
        if negative {
            return 0;
        }
        digits.parse::<usize>().unwrap_or(usize::MAX)
    }

    pub fn limit(&self) -> usize {
        Self::parse(self.limit.as_deref(), DEFAULT_HISTORY_LIMIT)
    }

    pub fn offset(&self) -> usize {
        Self::parse(self.offset.as_deref(), 0)
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub count: usize,
    pub returned: usize,
    pub predictions: Vec<PredictionResult>,
}

pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Json<HistoryResponse> {
    let query = HistoryQuery::from_pairs(pairs);
    let (count, predictions) = state
        .predictor
        .store()
        .history()
        .query(query.limit(), query.offset())
        .await;
    Json(HistoryResponse {
        count,
        returned: predictions.len(),
        predictions,
    })
}

pub async fn clear_history(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let count = state.predictor.store().history().clear().await;
    log::info!("Cleared {} predictions", count);
    Json(json!({ "message": format!("Cleared {} predictions", count) }))
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsReport> {
    Json(stats::stats(state.predictor.store().history()).await)
}

pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Endpoint not found" })),
    )
}

/// Last line of defence for faults nothing else handled.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    log::error!("Server error: {}", detail);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}
