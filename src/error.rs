//! Error types for the suggestion pipeline.
//!
//! Each subsystem owns one error enum. The propagation policy mirrors the
//! runtime behavior: retrieval and generation failures degrade a single
//! turn ("no KB context" / "no suggestion") and never abort the session;
//! only configuration problems such as a missing API key are surfaced
//! eagerly, before a session starts.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised by the LLM provider adapters and client.
#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    /// No API key was configured for the selected provider.
    ///
    /// Raised when the client is constructed, not per request, so a
    /// misconfigured session fails before any audio is processed.
    #[error("missing API key for provider `{provider}`")]
    #[diagnostic(
        code(cueline::provider::missing_key),
        help("Set the provider API key in the session configuration or environment.")
    )]
    MissingApiKey { provider: &'static str },

    /// The provider answered with a 429. Never retried inline; the
    /// coordinator opens a backoff window instead.
    #[error("provider rate limited; retry after {retry_after:?}")]
    #[diagnostic(code(cueline::provider::rate_limited))]
    RateLimited { retry_after: Duration },

    /// Non-429 HTTP failure, raw status and (truncated) body preserved
    /// for logging.
    #[error("provider returned HTTP {status}: {message}")]
    #[diagnostic(code(cueline::provider::http))]
    Http { status: u16, message: String },

    /// Transport-level failure, including request timeouts.
    #[error("provider network error: {0}")]
    #[diagnostic(code(cueline::provider::network))]
    Network(#[from] reqwest::Error),

    /// The response parsed but carried no completion text.
    #[error("provider response contained no completion text")]
    #[diagnostic(code(cueline::provider::empty))]
    EmptyResponse,

    /// JSON mode was requested but the reply did not parse as JSON,
    /// even after stripping Markdown code fences.
    #[error("structured output did not parse: {message}")]
    #[diagnostic(
        code(cueline::provider::structured_output),
        help("The model returned malformed JSON; the raw text is preserved in `message`.")
    )]
    StructuredOutput { message: String },
}

/// Errors raised by the embedding client.
#[derive(Debug, Error, Diagnostic)]
pub enum EmbeddingError {
    /// No API key was configured for the embedding service.
    #[error("missing API key for the embedding service")]
    #[diagnostic(
        code(cueline::embedding::missing_key),
        help("Set the embedding API key; KB features are disabled without it.")
    )]
    MissingApiKey,

    /// Non-retryable HTTP failure from the embedding endpoint.
    #[error("embedding service returned HTTP {status}: {message}")]
    #[diagnostic(code(cueline::embedding::http))]
    Http { status: u16, message: String },

    /// Transport-level failure, including request timeouts.
    #[error("embedding network error: {0}")]
    #[diagnostic(code(cueline::embedding::network))]
    Network(#[from] reqwest::Error),

    /// The service returned fewer vectors than texts submitted.
    #[error("embedding response was empty or incomplete")]
    #[diagnostic(code(cueline::embedding::empty))]
    EmptyResponse,

    /// All retry attempts were consumed without a successful response.
    #[error("embedding request failed after {attempts} attempts: {message}")]
    #[diagnostic(code(cueline::embedding::exhausted))]
    Exhausted { attempts: u32, message: String },
}

/// Errors raised by the knowledge-base store, retrieval, and ingestion.
#[derive(Debug, Error, Diagnostic)]
pub enum KbError {
    /// Storage backend failure (SQLite I/O, corrupt rows, ...).
    #[error("KB storage error: {message}")]
    #[diagnostic(code(cueline::kb::storage))]
    Storage { message: String },

    /// Another document is currently being ingested. Only one ingestion
    /// may run at a time; the caller should retry once it completes.
    #[error("another document ingestion is already in progress")]
    #[diagnostic(
        code(cueline::kb::ingestion_busy),
        help("Wait for the in-flight ingestion to finish, then retry the upload.")
    )]
    IngestionBusy,

    /// The uploaded bytes declared a type the pipeline cannot extract
    /// text from.
    #[error("unsupported document format: {declared}")]
    #[diagnostic(code(cueline::kb::unsupported_format))]
    UnsupportedFormat { declared: String },

    /// The uploaded bytes were not valid UTF-8.
    #[error("document bytes are not valid UTF-8")]
    #[diagnostic(code(cueline::kb::invalid_encoding))]
    InvalidEncoding,

    /// The document contained no extractable text.
    #[error("document contained no text to ingest")]
    #[diagnostic(code(cueline::kb::empty_document))]
    EmptyDocument,

    /// Embedding failure during ingestion or query embedding. Callers
    /// performing retrieval treat this as "no KB context available".
    #[error("embedding failure: {0}")]
    #[diagnostic(code(cueline::kb::embedding))]
    Embedding(#[from] EmbeddingError),

    /// No such document in the corpus.
    #[error("unknown document: {id}")]
    #[diagnostic(code(cueline::kb::unknown_document))]
    UnknownDocument { id: String },
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for KbError {
    fn from(err: sqlx::Error) -> Self {
        KbError::Storage {
            message: err.to_string(),
        }
    }
}

/// Errors surfaced through the session handle.
#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    /// The session actor has already shut down.
    #[error("session is closed")]
    #[diagnostic(code(cueline::session::closed))]
    Closed,

    /// Provider client construction failed (configuration problem).
    #[error(transparent)]
    #[diagnostic(transparent)]
    Provider(#[from] ProviderError),
}
