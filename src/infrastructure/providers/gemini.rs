//! Native protocol client (Gemini REST `generateContent`).
//!
//! The only variant that can perform a true web-grounded search: the request
//! carries a `google_search` tool declaration and the response comes back
//! with grounding metadata (executed search queries, source chunks, citation
//! spans) that is normalized into [`GenerationResult`].

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::ports::{
    Capabilities, Citation, GenerationRequest, GenerationResult, ProviderClient, ProviderError,
};
use crate::infrastructure::registry::ModelDescriptor;

use super::pacer::{RequestPacer, NATIVE_MIN_INTERVAL};
use super::retry::RetryPolicy;

/// Temperature used for grounded search calls; low to keep extraction literal.
const SEARCH_TEMPERATURE: f32 = 0.1;

/// Output ceiling for grounded search calls.
const SEARCH_MAX_OUTPUT_TOKENS: u32 = 8192;

/// Client for the native generateContent protocol.
pub struct GeminiClient {
    http: HttpClient,
    api_key: String,
    descriptor: ModelDescriptor,
    pacer: RequestPacer,
    retry: RetryPolicy,
    allow_degraded_search: bool,
}

impl GeminiClient {
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
            .map_or(NATIVE_MIN_INTERVAL, Duration::from_millis);

        Ok(Self {
            http,
            api_key,
            descriptor,
            pacer: RequestPacer::new(min_interval),
            retry: RetryPolicy::single(),
            allow_degraded_search,
        })
    }

    /// One paced request/parse cycle; remote failures come back as
    /// failure-carrying results.
    async fn dispatch(&self, request: &GenerationRequest) -> GenerationResult {
        self.pacer.acquire().await;

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.descriptor.base_url, request.model, self.api_key
        );

        let mut generation_config = json!({
            "temperature": request.temperature.unwrap_or(self.descriptor.temperature),
        });
        if let Some(max_tokens) = request.max_output_tokens {
            generation_config["maxOutputTokens"] = json!(max_tokens);
        }

        let mut payload = json!({
            "contents": [{"parts": [{"text": request.prompt}]}],
            "generationConfig": generation_config,
        });
        if let Some(tools) = &request.tools {
            payload["tools"] = tools.clone();
        }

        debug!(model = %request.model, "POST generateContent");

        let mut http_request = self.http.post(&url).json(&payload);
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
            warn!(%status, "generateContent error response");
            return GenerationResult::failure(format!("HTTP {status}: {body}"));
        }

        let parsed: GenerateContentResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => return GenerationResult::failure(format!("malformed response: {e}")),
        };

        Self::normalize(parsed)
    }

    /// Map the raw response into the normalized result shape.
    fn normalize(response: GenerateContentResponse) -> GenerationResult {
        if let Some(error) = response.error {
            return GenerationResult::failure(format!(
                "provider error {}: {}",
                error.code.unwrap_or_default(),
                error.message.unwrap_or_default()
            ));
        }

        let Some(candidate) = response.candidates.unwrap_or_default().into_iter().next() else {
            return GenerationResult::failure("response contained no candidates");
        };

        let text = candidate
            .content
            .and_then(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("");

        match candidate.grounding_metadata {
            Some(metadata) => {
                let search_queries = metadata.web_search_queries.unwrap_or_default();
                let chunks = metadata.grounding_chunks.unwrap_or_default();
                let supports = metadata.grounding_supports.unwrap_or_default();
                let citations = extract_citations(&supports, &chunks);
                GenerationResult::grounded(text, citations, search_queries)
            }
            None => GenerationResult::ok(text),
        }
    }
}

/// Walk the citation spans and resolve each referenced chunk to a source.
fn extract_citations(supports: &[GroundingSupport], chunks: &[GroundingChunk]) -> Vec<Citation> {
    let mut citations = Vec::new();

    for support in supports {
        let Some(indices) = &support.grounding_chunk_indices else {
            continue;
        };
        for &index in indices {
            let Some(web) = chunks.get(index).and_then(|chunk| chunk.web.as_ref()) else {
                continue;
            };
            let title = clean_title(web.title.as_deref().unwrap_or("Unknown Source"));
            let url = web.uri.clone().unwrap_or_else(|| "#".to_string());
            citations.push(Citation { title, url });
        }
    }

    citations
}

/// Titles often arrive as file names; drop everything after the first dot.
fn clean_title(title: &str) -> String {
    match title.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => title.to_string(),
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn protocol_id(&self) -> &str {
        "gemini-native"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_search: self.descriptor.supports_search,
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
        let mut request = GenerationRequest::new(&self.descriptor.id, query)
            .with_temperature(SEARCH_TEMPERATURE)
            .with_max_output_tokens(SEARCH_MAX_OUTPUT_TOKENS);

        if grounding_requested {
            if self.descriptor.supports_search {
                request.tools = Some(json!([{"google_search": {}}]));
            } else if !self.allow_degraded_search {
                return Err(ProviderError::SearchUnsupported {
                    model: self.descriptor.id.clone(),
                });
            }
        }

        Ok(self.generate(request).await)
    }
}

// Wire types for the generateContent response.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<i64>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    web_search_queries: Option<Vec<String>>,
    grounding_chunks: Option<Vec<GroundingChunk>>,
    grounding_supports: Option<Vec<GroundingSupport>>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebSource>,
}

#[derive(Debug, Deserialize)]
struct WebSource {
    title: Option<String>,
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingSupport {
    grounding_chunk_indices: Option<Vec<usize>>,
}
