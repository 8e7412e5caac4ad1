//! Routers with deterministic stages for handler and pipeline tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use logroute_ai::remote::GenerateRequest;
use logroute_ai::{
    ClassifierContext, EmbeddingClassifier, PatternTable, RemoteClassifier, RemoteConfig,
    RemoteError, Router, TextGenerator,
};

/// Answers `Workflow Error` for prompts mentioning "failed", otherwise
/// `Deprecation Warning`. Each call sleeps 10 ms less than the one before,
/// so within a concurrent window earlier calls finish later.
#[derive(Default)]
struct SlowGenerator {
    started: AtomicU64,
}

#[async_trait]
impl TextGenerator for SlowGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, RemoteError> {
        let n = self.started.fetch_add(1, Ordering::SeqCst);
        let delay = 40u64.saturating_sub(n * 10);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let category = if request.prompt.contains("failed") {
            "Workflow Error"
        } else {
            "Deprecation Warning"
        };
        Ok(format!("<category>{category}</category>"))
    }
}

/// Patterns only; embedding and remote stages are unavailable.
pub fn pattern_router() -> Router {
    Router::new(Arc::new(ClassifierContext::new(
        PatternTable::builtin().unwrap(),
        EmbeddingClassifier::disabled(),
        RemoteClassifier::disabled(),
    )))
}

/// Patterns plus a slow scripted remote stage for the legacy source.
pub fn legacy_router() -> Router {
    Router::new(Arc::new(ClassifierContext::new(
        PatternTable::builtin().unwrap(),
        EmbeddingClassifier::disabled(),
        RemoteClassifier::with_generator(RemoteConfig::default(), Arc::new(SlowGenerator::default())),
    )))
}
