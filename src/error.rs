//! Error taxonomy for the prediction service and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StrokeError>;

#[derive(Error, Debug)]
pub enum StrokeError {
    #[error("request body cannot be empty")]
    EmptyBody,
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),
    #[error("request body must be a JSON object")]
    NotAnObject,
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("model is not loaded")]
    ModelUnavailable,
    #[error("could not load model from {path:?}: {reason}")]
    ModelLoad { path: PathBuf, reason: String },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StrokeError {
    /// Input errors are the caller's to fix; everything else is ours.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StrokeError::EmptyBody
                | StrokeError::InvalidJson(_)
                | StrokeError::NotAnObject
                | StrokeError::Validation(_)
        )
    }
}

impl IntoResponse for StrokeError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            StrokeError::EmptyBody => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Request body cannot be empty" }),
            ),
            StrokeError::InvalidJson(_) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid JSON body" }),
            ),
            StrokeError::NotAnObject => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Request body must be a JSON object" }),
            ),
            StrokeError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Validation failed", "details": details }),
            ),
            StrokeError::ModelUnavailable => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "ML model not available" }),
            ),
            _ => {
                log::error!("Prediction error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Prediction failed" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_are_client_errors() {
        assert!(StrokeError::EmptyBody.is_client_error());
        assert!(StrokeError::Validation(vec!["x".into()]).is_client_error());
        assert!(!StrokeError::ModelUnavailable.is_client_error());
        assert!(!StrokeError::Timeout("inference").is_client_error());
    }

    #[test]
    fn status_codes_follow_the_taxonomy() {
        let cases = [
            (StrokeError::EmptyBody, StatusCode::BAD_REQUEST),
            (StrokeError::NotAnObject, StatusCode::BAD_REQUEST),
            (
                StrokeError::Validation(vec!["age must be between 18 and 120".into()]),
                StatusCode::BAD_REQUEST,
            ),
            (StrokeError::ModelUnavailable, StatusCode::INTERNAL_SERVER_ERROR),
            (
                StrokeError::Inference("bad shape".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn validation_message_joins_details() {
        let err = StrokeError::Validation(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "validation failed: a; b");
    }
}
