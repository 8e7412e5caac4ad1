//! LLM fallback classifier over an OpenAI-compatible chat completions API.
//!
//! Only two labels can come back from this path, `Workflow Error` and
//! `Deprecation Warning`. Anything else the model says, and every transport
//! or credential failure, is reported as [`Label::Unclassified`].

use std::sync::{Arc, LazyLock, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use logroute_core::Label;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
/// Environment variable holding the bearer credential.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

static CATEGORY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<category>(.*?)</category>").expect("valid category regex"));

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("credential not set: ${0}")]
    MissingCredential(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("response contained no message content")]
    EmptyResponse,
    #[error("remote client unavailable")]
    ClientUnavailable,
}

/// Connection and sampling settings for the remote classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    /// API root, without the `/chat/completions` suffix.
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable read for the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: API_KEY_ENV.to_string(),
            temperature: 0.1,
            max_tokens: 50,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A single-turn generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text generation backend used by [`RemoteClassifier`].
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, RemoteError>;
}

// ── Chat completions wire types ──

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessageOut<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessageOut<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageIn,
}

#[derive(Deserialize)]
struct ChatMessageIn {
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl ChatClient {
    /// Create a client with an explicit API key.
    pub fn new(api_key: impl Into<String>, config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
        })
    }

    /// Create a client whose key comes from `config.api_key_env`.
    pub fn from_env(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RemoteError::MissingCredential(config.api_key_env.clone()))?;
        Self::new(api_key, config)
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<String, RemoteError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessageOut {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(url = %url, model = %self.model, "requesting completion");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let parsed: ChatResponse = serde_json::from_slice(&bytes)?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(RemoteError::EmptyResponse)
    }
}

/// Prompt asking the model to pick a category for `message`.
pub fn build_prompt(message: &str) -> String {
    format!(
        "Classify this log message into one category: \
         (1) Workflow Error, (2) Deprecation Warning, or (3) Unclassified.\n\
         Put answer in <category></category> tags.\n\n\
         Log: {message}"
    )
}

/// Extract the label from a model answer.
///
/// Only the first `<category>` span counts, and only an exact (trimmed)
/// `Workflow Error` or `Deprecation Warning` is accepted.
pub fn parse_category(answer: &str) -> Label {
    let Some(caps) = CATEGORY_TAG.captures(answer) else {
        return Label::Unclassified;
    };
    match caps[1].trim() {
        "Workflow Error" => Label::WorkflowError,
        "Deprecation Warning" => Label::DeprecationWarning,
        _ => Label::Unclassified,
    }
}

type Connector =
    Box<dyn Fn(&RemoteConfig) -> Result<Arc<dyn TextGenerator>, RemoteError> + Send + Sync>;

fn unavailable(_: &RemoteConfig) -> Result<Arc<dyn TextGenerator>, RemoteError> {
    Err(RemoteError::ClientUnavailable)
}

/// Lazily-connected remote classifier.
///
/// The client is built on first use. If that fails (typically a missing
/// credential) the failure is logged once and every later call returns
/// unclassified without contacting the network.
pub struct RemoteClassifier {
    config: RemoteConfig,
    connect: Connector,
    client: OnceLock<Option<Arc<dyn TextGenerator>>>,
}

impl RemoteClassifier {
    /// Classifier that builds a [`ChatClient`] from the environment on first use.
    pub fn from_env(config: RemoteConfig) -> Self {
        Self {
            config,
            connect: Box::new(
                |config: &RemoteConfig| -> Result<Arc<dyn TextGenerator>, RemoteError> {
                    Ok(Arc::new(ChatClient::from_env(config)?))
                },
            ),
            client: OnceLock::new(),
        }
    }

    /// Classifier backed by an already-constructed generator.
    pub fn with_generator(config: RemoteConfig, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            config,
            connect: Box::new(unavailable),
            client: OnceLock::from(Some(generator)),
        }
    }

    /// Classifier that never reaches a backend.
    pub fn disabled() -> Self {
        Self {
            config: RemoteConfig::default(),
            connect: Box::new(unavailable),
            client: OnceLock::from(None),
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Build the client if not yet attempted. Returns whether one is available.
    pub fn ensure_client(&self) -> bool {
        self.client().is_some()
    }

    fn client(&self) -> Option<&Arc<dyn TextGenerator>> {
        self.client
            .get_or_init(|| match (self.connect)(&self.config) {
                Ok(client) => {
                    info!(base_url = %self.config.base_url, model = %self.config.model, "remote classifier ready");
                    Some(client)
                }
                Err(e) => {
                    warn!(error = %e, "remote classifier unavailable");
                    None
                }
            })
            .as_ref()
    }

    /// Ask the backend for a category, reporting every failure.
    pub async fn try_classify(&self, message: &str) -> Result<Label, RemoteError> {
        let client = self.client().ok_or(RemoteError::ClientUnavailable)?;
        let request = GenerateRequest {
            prompt: build_prompt(message),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        let answer = client.generate(&request).await?;
        Ok(parse_category(&answer))
    }

    /// Remote label for `message`; unclassified on any failure.
    pub async fn classify_remote(&self, message: &str) -> Label {
        match self.try_classify(message).await {
            Ok(label) => label,
            Err(RemoteError::ClientUnavailable) => Label::Unclassified,
            Err(e) => {
                warn!(error = %e, "remote classification failed");
                Label::Unclassified
            }
        }
    }
}
