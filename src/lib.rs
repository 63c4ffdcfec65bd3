//! Stroke risk prediction service.
//!
//! A request flows through [`validation`] into the frozen classifier in
//! [`model`], is bucketed by [`risk`], recorded by [`store`] and returned.
//! [`stats`] and the history endpoints read the same in-memory log.

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod predictor;
pub mod records;
pub mod risk;
pub mod stats;
pub mod store;
pub mod validation;

pub use api::create_router;
pub use config::ServiceArgs;
pub use error::{Result, StrokeError};
pub use model::{ClassifierAdapter, ModelArtifact, StrokeClassifier};
pub use predictor::Predictor;
pub use records::{PatientRecord, PredictionResult};
pub use risk::RiskLevel;
pub use store::{HistoryLog, PredictionDb, ResultStore};
