//! Frozen stroke classifier and the adapter the request path talks to.
//!
//! The artifact is produced offline and read once at startup. Features reach
//! it as a smartcore `DenseMatrix` whose columns follow
//! [`VALIDATION_RULES`](crate::records::VALIDATION_RULES) order; changing that
//! order requires retraining.

use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, StrokeError};
use crate::records::{feature_names, PatientRecord, FEATURE_COUNT};

/// Allowed drift of `P(no stroke) + P(stroke)` away from 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Binary classifier over rows of `[age, hypertension, heart_disease,
/// avg_glucose_level, bmi, smoking_status]`.
pub trait StrokeClassifier: Send + Sync {
    /// One `[P(no stroke), P(stroke)]` pair per row.
    fn predict_proba(&self, x: &DenseMatrix<f64>) -> Result<Vec<[f64; 2]>>;

    /// Ties resolve to label 0.
    fn predict(&self, x: &DenseMatrix<f64>) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(x)?
            .iter()
            .map(|p| if p[1] > p[0] { 1 } else { 0 })
            .collect())
    }
}

/// Descriptive metadata reported by `/api/model-info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub training_date: String,
    pub accuracy: f64,
    pub features: Vec<&'static str>,
}

impl Default for ModelInfo {
    fn default() -> Self {
        ModelInfo {
            model_type: "RandomForestClassifier".to_string(),
            training_date: "2026-02-07".to_string(),
            accuracy: 0.95,
            features: feature_names(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub model_type: Option<String>,
    pub training_date: Option<String>,
    pub accuracy: Option<f64>,
}

/// On-disk form of the frozen model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    #[serde(default)]
    pub metadata: ArtifactMetadata,
    pub estimator: Estimator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    RandomForest { trees: Vec<DecisionTree> },
    Logistic { coefficients: Vec<f64>, intercept: f64 },
}

/// Flat node array; node 0 is the root and children always sit after their
/// parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Class weights `[no stroke, stroke]`; normalized at prediction time.
    Leaf { value: [f64; 2] },
}

impl ModelArtifact {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let load_err = |reason: String| StrokeError::ModelLoad {
            path: path.to_path_buf(),
            reason,
        };

        let raw = fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let artifact: ModelArtifact =
            serde_json::from_str(&raw).map_err(|e| load_err(e.to_string()))?;
        artifact.estimator.check().map_err(load_err)?;
        Ok(artifact)
    }

    pub fn info(&self) -> ModelInfo {
        let defaults = ModelInfo::default();
        ModelInfo {
            model_type: self
                .metadata
                .model_type
                .clone()
                .unwrap_or(defaults.model_type),
            training_date: self
                .metadata
                .training_date
                .clone()
                .unwrap_or(defaults.training_date),
            accuracy: self.metadata.accuracy.unwrap_or(defaults.accuracy),
            features: defaults.features,
        }
    }
}

impl Estimator {
    /// Structural checks run once at load so prediction never indexes out of
    /// bounds or loops.
    fn check(&self) -> std::result::Result<(), String> {
        match self {
            Estimator::RandomForest { trees } => {
                if trees.is_empty() {
                    return Err("random forest has no trees".to_string());
                }
                for (t, tree) in trees.iter().enumerate() {
                    tree.check().map_err(|e| format!("tree {t}: {e}"))?;
                }
                Ok(())
            }
            Estimator::Logistic {
                coefficients,
                intercept,
            } => {
                if coefficients.len() != FEATURE_COUNT {
                    return Err(format!(
                        "expected {} coefficients, got {}",
                        FEATURE_COUNT,
                        coefficients.len()
                    ));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err("logistic weights must be finite".to_string());
                }
                Ok(())
            }
        }
    }
}

impl DecisionTree {
    fn check(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match *node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= FEATURE_COUNT {
                        return Err(format!("node {idx} splits on unknown feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {idx} has a non-finite threshold"));
                    }
                    for child in [left, right] {
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {idx} has invalid child {child}"));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    let total = value[0] + value[1];
                    if value.iter().any(|v| !v.is_finite() || *v < 0.0) || total <= 0.0 {
                        return Err(format!("node {idx} has invalid class weights"));
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf_distribution(&self, row: &[f64; FEATURE_COUNT]) -> [f64; 2] {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
                TreeNode::Leaf { value } => {
                    let total = value[0] + value[1];
                    return [value[0] / total, value[1] / total];
                }
            }
        }
    }
}

impl StrokeClassifier for Estimator {
    fn predict_proba(&self, x: &DenseMatrix<f64>) -> Result<Vec<[f64; 2]>> {
        let rows = rows(x)?;
        let proba = rows
            .iter()
            .map(|row| match self {
                Estimator::RandomForest { trees } => {
                    let mut sum = [0.0f64; 2];
                    for tree in trees {
                        let p = tree.leaf_distribution(row);
                        sum[0] += p[0];
                        sum[1] += p[1];
                    }
                    let n = trees.len() as f64;
                    [sum[0] / n, sum[1] / n]
                }
                Estimator::Logistic {
                    coefficients,
                    intercept,
                } => {
                    let z = *intercept
                        + coefficients
                            .iter()
                            .zip(row.iter())
                            .map(|(w, v)| w * v)
                            .sum::<f64>();
                    let p_stroke = 1.0 / (1.0 + (-z).exp());
                    [1.0 - p_stroke, p_stroke]
                }
            })
            .collect();
        Ok(proba)
    }
}

/// Builds the feature matrix smartcore-style, one row per record.
pub fn convert_features_to_matrix(records: &[PatientRecord]) -> DenseMatrix<f64> {
    let values: Vec<f64> = records.iter().flat_map(|r| r.features()).collect();
    DenseMatrix::new(records.len(), FEATURE_COUNT, values, false)
}

fn rows(x: &DenseMatrix<f64>) -> Result<Vec<[f64; FEATURE_COUNT]>> {
    let (nrows, ncols) = x.shape();
    if ncols != FEATURE_COUNT {
        return Err(StrokeError::Inference(format!(
            "expected {FEATURE_COUNT} feature columns, got {ncols}"
        )));
    }
    Ok((0..nrows)
        .map(|r| {
            let mut row = [0.0f64; FEATURE_COUNT];
            for (c, slot) in row.iter_mut().enumerate() {
                *slot = *x.get((r, c));
            }
            row
        })
        .collect())
}

/// Classifier output for a single record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub label: u8,
    /// `[P(no stroke), P(stroke)]`
    pub probabilities: [f64; 2],
}

impl Score {
    pub fn p_stroke(&self) -> f64 {
        self.probabilities[1]
    }

    pub fn p_no_stroke(&self) -> f64 {
        self.probabilities[0]
    }
}

/// Read-only handle on the loaded model, or on its absence.
#[derive(Clone)]
pub struct ClassifierAdapter {
    model: Option<Arc<dyn StrokeClassifier>>,
    info: ModelInfo,
}

impl ClassifierAdapter {
    pub fn new(model: Arc<dyn StrokeClassifier>, info: ModelInfo) -> Self {
        ClassifierAdapter {
            model: Some(model),
            info,
        }
    }

    pub fn unavailable() -> Self {
        ClassifierAdapter {
            model: None,
            info: ModelInfo::default(),
        }
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        let info = artifact.info();
        ClassifierAdapter::new(Arc::new(artifact.estimator), info)
    }

    /// A missing or broken artifact leaves the adapter unavailable instead of
    /// stopping the process; the other endpoints keep working.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        match ModelArtifact::from_path(&path) {
            Ok(artifact) => {
                log::info!("ML Model loaded successfully from {:?}", path.as_ref());
                ClassifierAdapter::from_artifact(artifact)
            }
            Err(e) => {
                log::error!("Error loading model: {}", e);
                ClassifierAdapter::unavailable()
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn score(&self, record: &PatientRecord) -> Result<Score> {
        let model = self.model.as_deref().ok_or(StrokeError::ModelUnavailable)?;
        score_with(model, record)
    }

    /// Runs [`score`](Self::score) on the blocking pool and gives up after
    /// `limit`. A panic inside the model surfaces as a task error.
    pub async fn score_within(&self, record: PatientRecord, limit: Duration) -> Result<Score> {
        let model = self.model.clone().ok_or(StrokeError::ModelUnavailable)?;
        let task = tokio::task::spawn_blocking(move || score_with(model.as_ref(), &record));
        match tokio::time::timeout(limit, task).await {
            Ok(Ok(score)) => score,
            Ok(Err(join_err)) => Err(StrokeError::Task(join_err.to_string())),
            Err(_) => Err(StrokeError::Timeout("inference")),
        }
    }
}

fn score_with(model: &dyn StrokeClassifier, record: &PatientRecord) -> Result<Score> {
    let x = convert_features_to_matrix(std::slice::from_ref(record));
    let label = first(model.predict(&x)?)?;
    let probabilities = first(model.predict_proba(&x)?)?;

    let in_range = probabilities
        .iter()
        .all(|p| p.is_finite() && (0.0..=1.0).contains(p));
    if !in_range || (probabilities[0] + probabilities[1] - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(StrokeError::Inference(format!(
            "model returned an invalid probability vector {probabilities:?}"
        )));
    }
    if label > 1 {
        return Err(StrokeError::Inference(format!("model returned label {label}")));
    }

    Ok(Score {
        label,
        probabilities,
    })
}

fn first<T>(values: Vec<T>) -> Result<T> {
    values
        .into_iter()
        .next()
        .ok_or_else(|| StrokeError::Inference("model returned no rows".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn record(age: i64, glucose: f64) -> PatientRecord {
        PatientRecord {
            age,
            hypertension: 1,
            heart_disease: 0,
            avg_glucose_level: glucose,
            bmi: 28.0,
            smoking_status: 1,
        }
    }

    /// Two stumps on age and glucose, so probabilities are easy to predict.
    fn forest() -> Estimator {
        serde_json::from_value(json!({
            "kind": "random_forest",
            "trees": [
                { "nodes": [
                    { "type": "split", "feature": 0, "threshold": 60.0, "left": 1, "right": 2 },
                    { "type": "leaf", "value": [9.0, 1.0] },
                    { "type": "leaf", "value": [3.0, 7.0] }
                ]},
                { "nodes": [
                    { "type": "split", "feature": 3, "threshold": 140.0, "left": 1, "right": 2 },
                    { "type": "leaf", "value": [8.0, 2.0] },
                    { "type": "leaf", "value": [1.0, 1.0] }
                ]}
            ]
        }))
        .unwrap()
    }

    fn write_artifact(value: serde_json::Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", value).unwrap();
        file
    }

    #[test]
    fn matrix_keeps_fixed_feature_order() {
        let x = convert_features_to_matrix(&[record(65, 150.0), record(30, 90.0)]);
        assert_eq!(x.shape(), (2, FEATURE_COUNT));
        assert_eq!(*x.get((0, 0)), 65.0);
        assert_eq!(*x.get((0, 3)), 150.0);
        assert_eq!(*x.get((1, 0)), 30.0);
        assert_eq!(*x.get((1, 4)), 28.0);
    }

    #[test]
    fn forest_averages_normalized_leaves() {
        let x = convert_features_to_matrix(&[record(65, 150.0), record(30, 90.0)]);
        let proba = forest().predict_proba(&x).unwrap();

        assert!((proba[0][1] - (0.7 + 0.5) / 2.0).abs() < 1e-12);
        assert!((proba[1][1] - (0.1 + 0.2) / 2.0).abs() < 1e-12);
        assert_eq!(forest().predict(&x).unwrap(), vec![1, 0]);
    }

    #[test]
    fn logistic_applies_sigmoid() {
        let model = Estimator::Logistic {
            coefficients: vec![0.0; FEATURE_COUNT],
            intercept: 0.0,
        };
        let x = convert_features_to_matrix(&[record(50, 100.0)]);
        assert_eq!(model.predict_proba(&x).unwrap(), vec![[0.5, 0.5]]);
        // an exact tie resolves to the negative class
        assert_eq!(model.predict(&x).unwrap(), vec![0]);
    }

    #[test]
    fn adapter_scores_with_consistent_probabilities() {
        let adapter = ClassifierAdapter::new(Arc::new(forest()), ModelInfo::default());
        let score = adapter.score(&record(65, 150.0)).unwrap();

        assert_eq!(score.label, 1);
        assert!((score.p_stroke() + score.p_no_stroke() - 1.0).abs() < PROBABILITY_TOLERANCE);
    }

    #[test]
    fn unavailable_adapter_refuses_to_score() {
        let adapter = ClassifierAdapter::unavailable();
        assert!(!adapter.is_loaded());
        assert!(matches!(
            adapter.score(&record(65, 150.0)),
            Err(StrokeError::ModelUnavailable)
        ));
    }

    struct Broken;

    impl StrokeClassifier for Broken {
        fn predict_proba(&self, _x: &DenseMatrix<f64>) -> Result<Vec<[f64; 2]>> {
            Ok(vec![[0.7, 0.7]])
        }
    }

    #[test]
    fn rejects_probability_vectors_that_do_not_sum_to_one() {
        let adapter = ClassifierAdapter::new(Arc::new(Broken), ModelInfo::default());
        assert!(matches!(
            adapter.score(&record(65, 150.0)),
            Err(StrokeError::Inference(_))
        ));
    }

    #[tokio::test]
    async fn score_within_runs_on_the_blocking_pool() {
        let adapter = ClassifierAdapter::new(Arc::new(forest()), ModelInfo::default());
        let score = adapter
            .score_within(record(30, 90.0), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(score.label, 0);

        let missing = ClassifierAdapter::unavailable()
            .score_within(record(30, 90.0), Duration::from_secs(5))
            .await;
        assert!(matches!(missing, Err(StrokeError::ModelUnavailable)));
    }

    #[test]
    fn loads_artifact_and_metadata_from_disk() {
        let file = write_artifact(json!({
            "metadata": { "training_date": "2026-03-01", "accuracy": 0.91 },
            "estimator": serde_json::to_value(forest()).unwrap()
        }));

        let artifact = ModelArtifact::from_path(file.path()).unwrap();
        let info = artifact.info();
        assert_eq!(info.model_type, "RandomForestClassifier");
        assert_eq!(info.training_date, "2026-03-01");
        assert_eq!(info.accuracy, 0.91);

        assert!(ClassifierAdapter::load(file.path()).is_loaded());
    }

    #[test]
    fn rejects_structurally_invalid_artifacts() {
        let cyclic = write_artifact(json!({
            "estimator": { "kind": "random_forest", "trees": [ { "nodes": [
                { "type": "split", "feature": 0, "threshold": 1.0, "left": 0, "right": 1 },
                { "type": "leaf", "value": [1.0, 0.0] }
            ]}]}
        }));
        assert!(matches!(
            ModelArtifact::from_path(cyclic.path()),
            Err(StrokeError::ModelLoad { .. })
        ));

        let short = write_artifact(json!({
            "estimator": { "kind": "logistic", "coefficients": [1.0, 2.0], "intercept": 0.0 }
        }));
        assert!(ModelArtifact::from_path(short.path()).is_err());

        let unknown_feature = write_artifact(json!({
            "estimator": { "kind": "random_forest", "trees": [ { "nodes": [
                { "type": "split", "feature": 9, "threshold": 1.0, "left": 1, "right": 2 },
                { "type": "leaf", "value": [1.0, 0.0] },
                { "type": "leaf", "value": [0.0, 1.0] }
            ]}]}
        }));
        assert!(ModelArtifact::from_path(unknown_feature.path()).is_err());
    }

    #[test]
    fn missing_artifact_leaves_adapter_unavailable() {
        let adapter = ClassifierAdapter::load("/nonexistent/stroke_model.json");
        assert!(!adapter.is_loaded());
        assert_eq!(adapter.info(), &ModelInfo::default());
    }
}
