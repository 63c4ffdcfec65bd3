use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};

use super::handlers;
use crate::predictor::Predictor;

#[derive(Clone)]
pub struct AppState {
    pub predictor: Predictor,
}

/// Builds the service router.
///
/// # Routes
///
/// - `GET /api/health` - liveness and model status
/// - `POST /api/predict` - score one patient record
/// - `GET /api/model-info` - model metadata and validation rules
/// - `GET /api/history` - window over this process's predictions (`limit`, `offset`)
/// - `DELETE /api/history` - forget this process's predictions
/// - `GET /api/stats` - risk distribution and average age
///
/// Unknown paths get a JSON 404 and handler panics a JSON 500.
pub fn create_router(predictor: Predictor) -> Router {
    let state = Arc::new(AppState { predictor });

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/predict", post(handlers::predict))
        .route("/api/model-info", get(handlers::model_info))
        .route(
            "/api/history",
            get(handlers::history).delete(handlers::clear_history),
        )
        .route("/api/stats", get(handlers::stats))
        .fallback(handlers::not_found)
        .layer(CatchPanicLayer::custom(handlers::panic_response))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
