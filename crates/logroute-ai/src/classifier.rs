//! Embedding-based classification: sentence embedding + trained predictor.
//!
//! Both models are loaded lazily, at most once per [`EmbeddingClassifier`].
//! A failed load is remembered, so later calls degrade to
//! [`Label::Unclassified`] instead of retrying the load on every message.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use logroute_core::Label;
use tracing::{debug, info, warn};

use crate::ClassifyError;
use crate::predictor::Predictor;

/// Probability floor below which a prediction is reported as unclassified.
pub const CONFIDENCE_FLOOR: f32 = 0.5;

/// Text-to-vector encoder.
pub trait TextEmbedder: Send + Sync {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// On-disk locations of the embedding model and predictor artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    /// Directory containing `model.onnx` and `tokenizer.json`.
    pub embedder_dir: PathBuf,
    /// JSON predictor artifact.
    pub predictor: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            embedder_dir: PathBuf::from("models").join("all-MiniLM-L6-v2"),
            predictor: PathBuf::from("models").join("log_classifier.json"),
        }
    }
}

/// A loaded embedder and the predictor trained on its vectors.
pub struct EmbeddingModels {
    embedder: Box<dyn TextEmbedder>,
    predictor: Predictor,
}

impl EmbeddingModels {
    pub fn new(embedder: Box<dyn TextEmbedder>, predictor: Predictor) -> Self {
        Self {
            embedder,
            predictor,
        }
    }

    /// Load the ONNX embedder and predictor artifact from `paths`.
    pub fn load(paths: &ModelPaths) -> anyhow::Result<Self> {
        let predictor = Predictor::load(&paths.predictor)?;
        let (embedder, dim) = load_embedder(paths)?;
        anyhow::ensure!(
            dim == predictor.dim(),
            "embedder produces {dim}-dim vectors but predictor expects {}",
            predictor.dim()
        );
        Ok(Self::new(embedder, predictor))
    }
}

#[cfg(feature = "onnx")]
fn load_embedder(paths: &ModelPaths) -> anyhow::Result<(Box<dyn TextEmbedder>, usize)> {
    let embedder = crate::embedder::Embedder::load(&paths.embedder_dir)?;
    let dim = embedder.dim();
    Ok((Box::new(std::sync::Mutex::new(embedder)), dim))
}

#[cfg(not(feature = "onnx"))]
fn load_embedder(paths: &ModelPaths) -> anyhow::Result<(Box<dyn TextEmbedder>, usize)> {
    anyhow::bail!(
        "built without the `onnx` feature; cannot load embedding model from {:?}",
        paths.embedder_dir
    )
}

/// A predicted label with its probability, after the confidence floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: Label,
    pub confidence: f32,
}

impl Prediction {
    /// Apply [`CONFIDENCE_FLOOR`]: low-probability labels become unclassified,
    /// keeping the probability.
    pub fn gated(label: Label, confidence: f32) -> Self {
        let label = if confidence < CONFIDENCE_FLOOR {
            Label::Unclassified
        } else {
            label
        };
        Self { label, confidence }
    }

    /// Label only, as reported by the basic (confidence-free) path.
    pub fn basic_label(&self) -> Label {
        self.label
    }
}

type Loader = Box<dyn Fn() -> anyhow::Result<EmbeddingModels> + Send + Sync>;

/// Lazily-loaded embedding classifier.
pub struct EmbeddingClassifier {
    loader: Loader,
    models: OnceLock<Option<EmbeddingModels>>,
}

impl EmbeddingClassifier {
    /// Classifier whose models come from `loader` on first use.
    pub fn new(
        loader: impl Fn() -> anyhow::Result<EmbeddingModels> + Send + Sync + 'static,
    ) -> Self {
        Self {
            loader: Box::new(loader),
            models: OnceLock::new(),
        }
    }

    /// Classifier that loads from disk on first use.
    pub fn from_paths(paths: ModelPaths) -> Self {
        Self::new(move || EmbeddingModels::load(&paths))
    }

    /// Classifier with models already in memory.
    pub fn with_models(models: EmbeddingModels) -> Self {
        Self {
            loader: Box::new(|| -> anyhow::Result<EmbeddingModels> {
                anyhow::bail!("models were supplied preloaded")
            }),
            models: OnceLock::from(Some(models)),
        }
    }

    /// Classifier that never has models; every call is unclassified.
    pub fn disabled() -> Self {
        Self::new(|| anyhow::bail!("embedding classifier disabled"))
    }

    /// Load models if this has not been attempted yet. Returns whether they are available.
    ///
    /// Concurrent first callers block on a single load; the outcome, success
    /// or failure, is shared by all later calls.
    pub fn ensure_loaded(&self) -> bool {
        self.models().is_some()
    }

    /// Forget a previous load outcome and try again.
    pub fn reload(&mut self) -> bool {
        self.models = OnceLock::new();
        self.ensure_loaded()
    }

    fn models(&self) -> Option<&EmbeddingModels> {
        self.models
            .get_or_init(|| match (self.loader)() {
                Ok(models) => {
                    info!(
                        classes = models.predictor.classes().len(),
                        dim = models.predictor.dim(),
                        "embedding classifier ready"
                    );
                    Some(models)
                }
                Err(e) => {
                    warn!(error = %format!("{e:#}"), "embedding models unavailable");
                    None
                }
            })
            .as_ref()
    }

    /// Embed `message` and predict, reporting every failure.
    pub fn try_predict(&self, message: &str) -> Result<Prediction, ClassifyError> {
        let models = self.models().ok_or(ClassifyError::ModelUnavailable)?;
        let embedding = models
            .embedder
            .embed(message)
            .map_err(|e| ClassifyError::Embedding(format!("{e:#}")))?;
        let (label, confidence) = models.predictor.predict(&embedding)?;
        Ok(Prediction::gated(label, confidence))
    }

    /// [`try_predict`](Self::try_predict) on the blocking pool, including any
    /// first-use model load.
    ///
    /// Dropping the future abandons the result; the inference itself runs to
    /// completion.
    pub async fn predict_blocking(
        self: &Arc<Self>,
        message: &str,
    ) -> Result<Prediction, ClassifyError> {
        let classifier = Arc::clone(self);
        let message = message.to_owned();
        tokio::task::spawn_blocking(move || classifier.try_predict(&message))
            .await
            .map_err(|e| ClassifyError::Task(e.to_string()))?
    }

    /// Predicted label and confidence; `(Unclassified, 0.0)` on any failure.
    pub fn embed_and_predict(&self, message: &str) -> (Label, f32) {
        match self.try_predict(message) {
            Ok(p) => (p.label, p.confidence),
            Err(e) => {
                debug!(error = %e, "embedding prediction failed");
                (Label::Unclassified, 0.0)
            }
        }
    }

    /// Predicted label only, with the same floor and failure handling.
    pub fn embed_and_predict_basic(&self, message: &str) -> Label {
        match self.try_predict(message) {
            Ok(p) => p.basic_label(),
            Err(e) => {
                debug!(error = %e, "embedding prediction failed");
                Label::Unclassified
            }
        }
    }
}
