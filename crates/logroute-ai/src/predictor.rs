//! Trained label predictor over sentence embeddings.
//!
//! The artifact is a JSON export of a linear (logistic-regression) model:
//!
//! ```json
//! { "classes": ["HTTP Status", "Security Alert"],
//!   "coef": [[0.12, -0.40, ...], [...]],
//!   "intercept": [0.3, -0.3] }
//! ```
//!
//! Multiclass models carry one coefficient row per class and are scored with
//! softmax. A two-class export with a single row follows the binary
//! convention: the row scores the second class through a sigmoid.

use std::path::Path;

use logroute_core::Label;
use serde::Deserialize;
use tracing::info;

use crate::ClassifyError;

#[derive(Deserialize)]
struct PredictorArtifact {
    classes: Vec<String>,
    coef: Vec<Vec<f32>>,
    intercept: Vec<f32>,
}

/// Linear probabilistic classifier mapping an embedding to a label distribution.
#[derive(Debug, Clone)]
pub struct Predictor {
    classes: Vec<Label>,
    coef: Vec<Vec<f32>>,
    intercept: Vec<f32>,
    dim: usize,
}

impl Predictor {
    /// Build a predictor, checking that classes, rows, and intercepts line up.
    pub fn new(
        classes: Vec<Label>,
        coef: Vec<Vec<f32>>,
        intercept: Vec<f32>,
    ) -> Result<Self, ClassifyError> {
        let invalid = |msg: String| -> Result<Self, ClassifyError> {
            Err(ClassifyError::Predictor(msg))
        };

        if classes.len() < 2 {
            return invalid(format!("need at least 2 classes, got {}", classes.len()));
        }
        let binary = classes.len() == 2 && coef.len() == 1;
        if !binary && coef.len() != classes.len() {
            return invalid(format!(
                "{} coefficient rows for {} classes",
                coef.len(),
                classes.len()
            ));
        }
        if intercept.len() != coef.len() {
            return invalid(format!(
                "{} intercepts for {} coefficient rows",
                intercept.len(),
                coef.len()
            ));
        }

        let dim = coef[0].len();
        if dim == 0 {
            return invalid("coefficient rows are empty".to_string());
        }
        if let Some(row) = coef.iter().position(|r| r.len() != dim) {
            return invalid(format!(
                "coefficient row {row} has {} values, expected {dim}",
                coef[row].len()
            ));
        }

        Ok(Self {
            classes,
            coef,
            intercept,
            dim,
        })
    }

    /// Parse a predictor from its JSON artifact text.
    pub fn from_json(json: &str) -> Result<Self, ClassifyError> {
        let artifact: PredictorArtifact = serde_json::from_str(json)
            .map_err(|e| ClassifyError::Predictor(format!("parse artifact: {e}")))?;

        let classes = artifact
            .classes
            .iter()
            .map(|c| c.parse::<Label>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ClassifyError::Predictor(e.to_string()))?;

        Self::new(classes, artifact.coef, artifact.intercept)
    }

    /// Load a predictor artifact from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        anyhow::ensure!(path.exists(), "predictor artifact not found at {path:?}");
        let json = std::fs::read_to_string(path)?;
        let predictor = Self::from_json(&json)?;
        info!(
            classes = predictor.classes.len(),
            dim = predictor.dim,
            artifact = %path.display(),
            "loaded predictor"
        );
        Ok(predictor)
    }

    /// Expected embedding dimensionality.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn classes(&self) -> &[Label] {
        &self.classes
    }

    /// Probability for each entry of [`classes`](Self::classes), summing to 1.
    pub fn predict_proba(&self, embedding: &[f32]) -> Result<Vec<f32>, ClassifyError> {
        if embedding.len() != self.dim {
            return Err(ClassifyError::Predictor(format!(
                "embedding has {} dimensions, predictor expects {}",
                embedding.len(),
                self.dim
            )));
        }

        let scores: Vec<f32> = self
            .coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| dot(row, embedding) + b)
            .collect();

        if scores.len() == 1 {
            let p = sigmoid(scores[0]);
            return Ok(vec![1.0 - p, p]);
        }
        Ok(softmax(&scores))
    }

    /// Most probable label and its probability.
    pub fn predict(&self, embedding: &[f32]) -> Result<(Label, f32), ClassifyError> {
        let proba = self.predict_proba(embedding)?;
        let (idx, p) = argmax(&proba)
            .ok_or_else(|| ClassifyError::Predictor("empty probability vector".to_string()))?;
        if !p.is_finite() {
            return Err(ClassifyError::Predictor(format!(
                "non-finite probability {p}"
            )));
        }
        Ok((self.classes[idx], p))
    }
}

// ── Scoring helpers ──

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax.
fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest entry; ties go to the lowest index.
fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((i, v)),
        })
}
