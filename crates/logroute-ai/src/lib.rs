//! Classification layer: regex rules, ONNX embeddings with a trained predictor,
//! an LLM fallback, and the router that chooses between them.

mod error;
pub use error::ClassifyError;

pub mod classifier;
pub mod context;
pub mod patterns;
pub mod predictor;
pub mod remote;
pub mod router;

#[cfg(feature = "onnx")]
mod embedder;
#[cfg(feature = "onnx")]
pub use embedder::Embedder;

pub use classifier::{EmbeddingClassifier, EmbeddingModels, ModelPaths, Prediction, TextEmbedder};
pub use context::{ClassifierContext, Readiness};
pub use patterns::PatternTable;
pub use predictor::Predictor;
pub use remote::{ChatClient, RemoteClassifier, RemoteConfig, RemoteError, TextGenerator};
pub use router::{Route, Router, RouterPolicy};
