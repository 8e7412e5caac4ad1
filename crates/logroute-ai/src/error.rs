use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("embedding model is not loaded")]
    ModelUnavailable,

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding task failed: {0}")]
    Task(String),

    #[error("predictor error: {0}")]
    Predictor(String),

    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
