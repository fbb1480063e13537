//! Session configuration.
//!
//! All settings are read once when a session starts and are immutable for
//! its lifetime; changing providers, models, or thresholds requires a new
//! session. [`SessionConfig::from_env`] pulls credentials and overrides
//! from the environment (a `.env` file is honored via `dotenvy`), which is
//! how the surrounding application is expected to wire real deployments.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which LLM wire family the session talks to.
///
/// A closed set: adding a backend means adding a variant and its adapter,
/// never touching call sites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google-style wire format: key as query parameter, `contents` array.
    Gemini,
    /// OpenAI-compatible wire format: bearer auth, `messages` array.
    OpenAi,
}

impl ProviderKind {
    /// Stable lowercase label used in logs and serialized events.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "openai" | "openai-compatible" => Ok(ProviderKind::OpenAi),
            other => Err(format!("unknown provider kind: {other}")),
        }
    }
}

/// Generation backend settings.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Model identifier in the provider's own vocabulary.
    pub model: String,
    pub api_key: String,
    /// Override for the provider base URL; `None` uses the public endpoint.
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Wall-clock timeout per generation call. Expiry is treated like any
    /// other network failure.
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Gemini,
            model: "gemini-2.0-flash".to_string(),
            api_key: String::new(),
            base_url: None,
            max_tokens: 512,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Knowledge-base retrieval settings.
#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity for a chunk to count as relevant.
    pub threshold: f32,
    /// Maximum number of chunks returned per query.
    pub top_k: usize,
    /// Scan batch size. The corpus is always scanned in bounded batches so
    /// memory stays constant regardless of corpus size.
    pub scan_batch: usize,
    /// Cap on the formatted context injected into the prompt.
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            top_k: 3,
            scan_batch: 256,
            max_context_chars: 8_000,
        }
    }
}

/// Embedding service settings.
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub api_key: String,
    pub model: String,
    /// Override for the embedding base URL; `None` uses the public endpoint.
    pub base_url: Option<String>,
    /// Expected vector dimensionality. Mismatched responses are a
    /// configuration error, not something to recover from at query time.
    pub dimension: usize,
    pub timeout: Duration,
    /// Retry budget for 429/5xx/network failures (exponential backoff).
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-embedding-001".to_string(),
            base_url: None,
            dimension: 768,
            timeout: Duration::from_secs(20),
            max_retries: 3,
        }
    }
}

/// Default system prompt used when the settings collaborator supplies none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a real-time assistant for a live call. \
Watch the conversation and, when the other party asks a question, raises an objection, \
or mentions a relevant topic, provide a short suggestion the user can glance at: \
2-4 bullet points, most important first, plain language. \
If you have nothing useful to add, reply with exactly ---";

/// Everything a session needs, loaded once at session start.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub provider: ProviderConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    /// Minimum time between two admitted generation attempts.
    pub cooldown: Duration,
    pub system_prompt: String,
    /// Persona scoping: KB retrieval only considers these document ids.
    /// Empty means every complete document is eligible.
    pub allowed_documents: Vec<String>,
    /// When set, the first speaker heard is treated as the user themselves
    /// and their utterances never trigger suggestions.
    pub skip_first_speaker: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            cooldown: Duration::from_millis(15_000),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            allowed_documents: Vec::new(),
            skip_first_speaker: false,
        }
    }
}

impl SessionConfig {
    /// Builder-style override for the cooldown window.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Builder-style override for the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Builder-style override for the persona document allow-list.
    #[must_use]
    pub fn with_allowed_documents(mut self, ids: Vec<String>) -> Self {
        self.allowed_documents = ids;
        self
    }

    /// Load configuration from the environment.
    ///
    /// Honors a `.env` file when present. Recognized variables:
    ///
    /// - `CUELINE_PROVIDER` (`gemini` | `openai`), `CUELINE_MODEL`
    /// - `GEMINI_API_KEY`, `OPENAI_API_KEY` (picked per provider; the
    ///   Gemini key also feeds the embedding client)
    /// - `CUELINE_COOLDOWN_MS`, `CUELINE_KB_THRESHOLD`, `CUELINE_KB_TOP_K`
    /// - `CUELINE_SYSTEM_PROMPT`
    ///
    /// Unset variables keep their defaults; parse failures fall back to the
    /// default rather than aborting startup.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("CUELINE_PROVIDER")
            && let Ok(kind) = raw.parse::<ProviderKind>()
        {
            config.provider.kind = kind;
        }
        if let Ok(model) = std::env::var("CUELINE_MODEL") {
            config.provider.model = model;
        }
        let key_var = match config.provider.kind {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        };
        if let Ok(key) = std::env::var(key_var) {
            config.provider.api_key = key;
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.embedding.api_key = key;
        }
        if let Ok(raw) = std::env::var("CUELINE_COOLDOWN_MS")
            && let Ok(ms) = raw.parse::<u64>()
        {
            config.cooldown = Duration::from_millis(ms);
        }
        if let Ok(raw) = std::env::var("CUELINE_KB_THRESHOLD")
            && let Ok(threshold) = raw.parse::<f32>()
        {
            config.retrieval.threshold = threshold;
        }
        if let Ok(raw) = std::env::var("CUELINE_KB_TOP_K")
            && let Ok(top_k) = raw.parse::<usize>()
        {
            config.retrieval.top_k = top_k;
        }
        if let Ok(prompt) = std::env::var("CUELINE_SYSTEM_PROMPT") {
            config.system_prompt = prompt;
        }

        config
    }
}
