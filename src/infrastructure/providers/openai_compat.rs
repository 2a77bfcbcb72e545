//! Generic protocol client (OpenAI-compatible chat completions).
//!
//! Speaks the chat-completion shape over HTTP to a configurable base address.
//! No grounding metadata is ever present on this path; a search-style query
//! is either answered from the model's prior knowledge (degraded) or refused
//! when degraded output is disallowed.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::ports::{
    Capabilities, GenerationRequest, GenerationResult, ProviderClient, ProviderError,
};
use crate::infrastructure::registry::ModelDescriptor;

use super::pacer::{RequestPacer, GENERIC_MIN_INTERVAL};
use super::retry::RetryPolicy;

/// Client for OpenAI-compatible chat-completions endpoints.
pub struct OpenAiCompatClient {
    http: HttpClient,
    api_key: String,
    descriptor: ModelDescriptor,
    pacer: RequestPacer,
    retry: RetryPolicy,
    allow_degraded_search: bool,
}

impl OpenAiCompatClient {
    /// Construct a client bound to one model descriptor.
    ///
    /// # Errors
    /// `ProviderError::InvalidRequest` for an empty API key or an HTTP client
    /// that cannot be built. Construction performs no I/O.
    pub fn new(
        descriptor: ModelDescriptor,
        api_key: String,
        timeout: Duration,
        allow_degraded_search: bool,
    ) -> Result<Self, ProviderError> {
        if api_key.is_empty() {
            return Err(ProviderError::InvalidRequest("API key cannot be empty".to_string()));
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| ProviderError::InvalidRequest(format!("failed to build HTTP client: {e}")))?;

        let min_interval = descriptor
            .min_request_interval_ms
            .map_or(GENERIC_MIN_INTERVAL, Duration::from_millis);

        Ok(Self {
            http,
            api_key,
            descriptor,
            pacer: RequestPacer::new(min_interval),
            retry: RetryPolicy::single(),
            allow_degraded_search,
        })
    }

    async fn dispatch(&self, request: &GenerationRequest) -> GenerationResult {
        self.pacer.acquire().await;

        let url = format!("{}/chat/completions", self.descriptor.base_url);

        let mut payload = json!({
            "model": request.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "temperature": request.temperature.unwrap_or(self.descriptor.temperature),
        });
        if let Some(max_tokens) = request.max_output_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }

        debug!(model = %request.model, "POST chat/completions");

        let mut http_request = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload);
        for (name, value) in &self.descriptor.headers {
            http_request = http_request.header(name, value);
        }

        let response = match http_request.send().await {
            Ok(response) => response,
            Err(e) => return GenerationResult::failure(format!("request failed: {e}")),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            warn!(%status, "chat/completions error response");
            return GenerationResult::failure(format!("HTTP {status}: {body}"));
        }

        let parsed: ChatCompletionResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => return GenerationResult::failure(format!("malformed response: {e}")),
        };

        Self::normalize(parsed)
    }

    fn normalize(response: ChatCompletionResponse) -> GenerationResult {
        if let Some(error) = response.error {
            return GenerationResult::failure(format!(
                "provider error: {}",
                error.message.unwrap_or_default()
            ));
        }

        let text = response
            .choices
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content);

        match text {
            Some(text) => GenerationResult::ok(text),
            None => GenerationResult::failure("response contained no choices"),
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatClient {
    fn protocol_id(&self) -> &str {
        "openai-compat"
    }

    fn capabilities(&self) -> Capabilities {
        // The generic protocol can never ground, whatever the model claims.
        Capabilities {
            supports_search: false,
            supports_tools: self.descriptor.supports_tools,
        }
    }

    async fn generate(&self, request: GenerationRequest) -> GenerationResult {
        self.retry.execute(|| self.dispatch(&request)).await
    }

    async fn search(
        &self,
        query: &str,
        grounding_requested: bool,
    ) -> Result<GenerationResult, ProviderError> {
        if grounding_requested && !self.allow_degraded_search {
            return Err(ProviderError::SearchUnsupported {
                model: self.descriptor.id.clone(),
            });
        }

        // Degraded path: answer from prior knowledge, no grounding claim.
        let request = GenerationRequest::new(&self.descriptor.id, query)
            .with_max_output_tokens(self.descriptor.max_output_tokens);
        Ok(self.generate(request).await)
    }
}

// Wire types for the chat-completion response.

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
}
