//! Tiered routing of a log record to a label.
//!
//! Stages, first decisive one wins:
//!
//! 1. Legacy source: remote classifier only.
//! 2. Pattern rules.
//! 3. Embedding prediction above [`CONFIDENT_THRESHOLD`].
//! 4. The same prediction if it cleared the basic confidence floor.
//! 5. [`Label::Unclassified`].
//!
//! Routing never fails: stage errors are logged and count as unclassified,
//! and a panic inside a stage is caught here. Embedding inference runs on the
//! blocking pool, so wrapping [`Router::route`] in `tokio::time::timeout`
//! bounds it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use logroute_core::Label;
use tracing::{debug, error, warn};

use crate::ClassifyError;
use crate::classifier::Prediction;
use crate::context::ClassifierContext;

/// Source identifier routed exclusively through the remote classifier.
pub const LEGACY_SOURCE: &str = "LegacyCRM";
/// Embedding confidence must exceed this to be accepted at stage 3.
pub const CONFIDENT_THRESHOLD: f32 = 0.7;

/// Tunable routing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterPolicy {
    /// Compared exactly (case-sensitive) against the record's source.
    pub legacy_source: String,
    pub confident_threshold: f32,
}

impl Default for RouterPolicy {
    fn default() -> Self {
        Self {
            legacy_source: LEGACY_SOURCE.to_string(),
            confident_threshold: CONFIDENT_THRESHOLD,
        }
    }
}

impl RouterPolicy {
    /// Stage 3 gate: a real label with confidence strictly above the threshold.
    pub fn accepts_confident(&self, prediction: &Prediction) -> bool {
        !prediction.label.is_unclassified() && prediction.confidence > self.confident_threshold
    }

    pub fn is_legacy(&self, source: &str) -> bool {
        source == self.legacy_source
    }
}

/// Which stage produced a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Legacy,
    Pattern,
    ConfidentEmbedding,
    FallbackEmbedding,
    Unclassified,
}

/// Cheap-to-clone handle routing records through a shared [`ClassifierContext`].
#[derive(Clone)]
pub struct Router {
    ctx: Arc<ClassifierContext>,
    policy: Arc<RouterPolicy>,
}

impl Router {
    pub fn new(ctx: Arc<ClassifierContext>) -> Self {
        Self::with_policy(ctx, RouterPolicy::default())
    }

    pub fn with_policy(ctx: Arc<ClassifierContext>, policy: RouterPolicy) -> Self {
        Self {
            ctx,
            policy: Arc::new(policy),
        }
    }

    pub fn context(&self) -> &ClassifierContext {
        &self.ctx
    }

    pub fn policy(&self) -> &RouterPolicy {
        &self.policy
    }

    /// Label for one record.
    pub async fn route(&self, source: &str, message: &str) -> Label {
        self.route_with_decision(source, message).await.0
    }

    /// Label for one record together with the stage that decided it.
    pub async fn route_with_decision(&self, source: &str, message: &str) -> (Label, Route) {
        match AssertUnwindSafe(self.decide(source, message))
            .catch_unwind()
            .await
        {
            Ok((label, route)) => {
                debug!(source, label = %label, route = ?route, "routed");
                (label, route)
            }
            Err(payload) => {
                error!(
                    source,
                    panic = panic_message(&*payload),
                    "classification stage panicked"
                );
                (Label::Unclassified, Route::Unclassified)
            }
        }
    }

    async fn decide(&self, source: &str, message: &str) -> (Label, Route) {
        if self.policy.is_legacy(source) {
            let label = self.ctx.remote.classify_remote(message).await;
            return (label, Route::Legacy);
        }

        if let Some(label) = self.ctx.patterns.match_message(message) {
            return (label, Route::Pattern);
        }

        // One embedding feeds both the confident gate and the basic floor.
        match self.ctx.embedding.predict_blocking(message).await {
            Ok(prediction) => {
                if self.policy.accepts_confident(&prediction) {
                    return (prediction.label, Route::ConfidentEmbedding);
                }
                let basic = prediction.basic_label();
                if !basic.is_unclassified() {
                    return (basic, Route::FallbackEmbedding);
                }
            }
            Err(ClassifyError::ModelUnavailable) => {}
            Err(e) => warn!(error = %e, "embedding stage failed"),
        }

        (Label::Unclassified, Route::Unclassified)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
