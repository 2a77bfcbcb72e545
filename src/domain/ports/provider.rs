//! Provider client port.
//!
//! Abstraction over the two incompatible LLM provider protocols:
//! - Native protocol (Gemini generateContent) with built-in web-grounded search
//! - Generic HTTP chat-completions protocol with no search capability
//!
//! Callers issue "generate" and "search" requests without knowing which
//! protocol backs a given model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request for a single content generation call.
///
/// Value object, constructed per call and never shared.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Target model identifier (must be registered)
    pub model: String,

    /// Prompt text
    pub prompt: String,

    /// Sampling temperature; provider default applies when `None`
    pub temperature: Option<f32>,

    /// Output token ceiling; provider default applies when `None`
    pub max_output_tokens: Option<u32>,

    /// Raw tool declarations passed through to the native protocol.
    /// The generic protocol ignores these.
    pub tools: Option<serde_json::Value>,
}

impl GenerationRequest {
    /// Build a plain text request with provider defaults.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature: None,
            max_output_tokens: None,
            tools: None,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

/// A single normalized citation extracted from grounding metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Source title (cleaned, may be a bare domain)
    pub title: String,

    /// Source URL or redirect URI
    pub url: String,
}

/// Result of a generation or search call.
///
/// Ordinary provider failures are carried here (`success = false` plus
/// `error`), never raised. Produced once per call; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Whether the remote call produced usable output
    pub success: bool,

    /// Generated text (empty on failure)
    pub text: String,

    /// Ordered citations from grounding metadata (empty when ungrounded)
    pub citations: Vec<Citation>,

    /// Web search queries the provider actually issued
    pub search_queries: Vec<String>,

    /// True only when the output is backed by a live web search.
    /// Invariant: implies `search_queries` is non-empty.
    pub has_grounding: bool,

    /// Error detail when `success = false`
    pub error: Option<String>,
}

impl GenerationResult {
    /// Successful ungrounded result.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
            citations: Vec::new(),
            search_queries: Vec::new(),
            has_grounding: false,
            error: None,
        }
    }

    /// Successful grounded result.
    ///
    /// Grounding is only claimed when the provider reported at least one
    /// executed search query; otherwise the result is downgraded to plain.
    pub fn grounded(
        text: impl Into<String>,
        citations: Vec<Citation>,
        search_queries: Vec<String>,
    ) -> Self {
        let has_grounding = !search_queries.is_empty();
        Self {
            success: true,
            text: text.into(),
            citations,
            search_queries,
            has_grounding,
            error: None,
        }
    }

    /// Failed result carrying the provider error detail.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            text: String::new(),
            citations: Vec::new(),
            search_queries: Vec::new(),
            has_grounding: false,
            error: Some(error.into()),
        }
    }
}

/// Static capability flags for a provider client, resolved once at
/// construction time and never re-probed per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_search: bool,
    pub supports_tools: bool,
}

/// Errors a provider client may raise.
///
/// Only contract violations and explicit capability refusals surface here;
/// remote failures are returned inside [`GenerationResult`].
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("model '{model}' does not support grounded search and degraded output is disallowed")]
    SearchUnsupported { model: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Port trait for provider protocol implementations.
///
/// # Thread safety
///
/// Implementations must be `Send + Sync`; a constructed client is shared
/// read-only by any number of concurrent research runs. The only interior
/// state is the request pacer, which is synchronized per client.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Protocol identifier, e.g. "gemini-native" or "openai-compat".
    fn protocol_id(&self) -> &str;

    /// Static capability flags. Pure, no I/O.
    fn capabilities(&self) -> Capabilities;

    /// Execute a single generation call.
    ///
    /// Ordinary provider errors (network, quota, malformed response) come
    /// back as `success = false` with error detail, never as a panic or a
    /// propagated error.
    async fn generate(&self, request: GenerationRequest) -> GenerationResult;

    /// Execute a search-style query.
    ///
    /// Native clients perform a true grounded web search and return real
    /// citations. Generic clients answer from prior knowledge with
    /// `has_grounding = false`, or refuse with
    /// [`ProviderError::SearchUnsupported`] when `grounding_requested` is set
    /// and degraded output is disallowed for this client.
    async fn search(
        &self,
        query: &str,
        grounding_requested: bool,
    ) -> Result<GenerationResult, ProviderError>;
}
