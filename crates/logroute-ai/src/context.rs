//! Shared classification resources, built once per process.

use std::sync::Arc;

use tracing::info;

use crate::ClassifyError;
use crate::classifier::{EmbeddingClassifier, ModelPaths};
use crate::patterns::PatternTable;
use crate::remote::{RemoteClassifier, RemoteConfig};

/// Readiness of each lazily-initialized stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub embedding: bool,
    pub remote: bool,
}

/// Pattern table plus the two lazily-initialized classifiers.
///
/// One context is shared (behind an `Arc`) by every concurrent classification.
/// The embedding classifier has its own `Arc` so inference can move to the
/// blocking pool.
pub struct ClassifierContext {
    pub patterns: PatternTable,
    pub embedding: Arc<EmbeddingClassifier>,
    pub remote: RemoteClassifier,
}

impl ClassifierContext {
    pub fn new(
        patterns: PatternTable,
        embedding: EmbeddingClassifier,
        remote: RemoteClassifier,
    ) -> Self {
        Self {
            patterns,
            embedding: Arc::new(embedding),
            remote,
        }
    }

    /// Built-in rules, on-disk models at `paths`, and an environment-keyed remote client.
    pub fn from_config(paths: ModelPaths, remote: RemoteConfig) -> Result<Self, ClassifyError> {
        let patterns = PatternTable::builtin()?;
        info!(
            rules = patterns.len(),
            predictor = %paths.predictor.display(),
            model = %remote.model,
            "classifier context configured"
        );
        Ok(Self::new(
            patterns,
            EmbeddingClassifier::from_paths(paths),
            RemoteClassifier::from_env(remote),
        ))
    }

    /// Eagerly run both lazy initializations instead of waiting for first use.
    pub fn ensure_initialized(&self) -> Readiness {
        Readiness {
            embedding: self.embedding.ensure_loaded(),
            remote: self.remote.ensure_client(),
        }
    }
}
