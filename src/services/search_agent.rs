//! Search agent.
//!
//! Issues a single grounded-or-plain query through a factory-resolved client
//! and normalizes the outcome regardless of which protocol served it. When
//! the resolved client cannot ground, the query is transparently re-issued as
//! plain generation and the outcome is annotated as degraded so the research
//! engine can adjust its reflection strategy.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::models::ApiMode;
use crate::domain::ports::Citation;
use crate::infrastructure::factory::ClientFactory;

/// Normalized result of one search-style query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// The query as issued
    pub query: String,

    /// Answer text (empty on failure)
    pub text: String,

    /// Ordered citations (empty unless grounded)
    pub citations: Vec<Citation>,

    /// Web search queries the provider actually executed
    pub search_queries: Vec<String>,

    /// True only for genuinely web-grounded answers
    pub has_grounding: bool,

    /// True when search was requested but the resolved client lacks search
    /// support, so the answer came from prior knowledge only
    pub degraded: bool,

    pub success: bool,
    pub error: Option<String>,
}

impl SearchOutcome {
    fn failure(query: &str, error: impl Into<String>) -> Self {
        Self {
            query: query.to_string(),
            text: String::new(),
            citations: Vec::new(),
            search_queries: Vec::new(),
            has_grounding: false,
            degraded: false,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Agent issuing search queries for the configured search-task model.
pub struct SearchAgent {
    factory: Arc<ClientFactory>,
    model: String,
    mode: ApiMode,
}

impl SearchAgent {
    pub fn new(factory: Arc<ClientFactory>, model: impl Into<String>, mode: ApiMode) -> Self {
        Self { factory, model: model.into(), mode }
    }

    /// Issue one query, grounded when possible.
    ///
    /// Never drops the query silently: factory failures, remote failures, and
    /// the refusal when degraded output is disallowed all surface as
    /// `success = false` with error detail. No retries here beyond the
    /// provider's own single call-site retry.
    pub async fn search_with_grounding(&self, query: &str, use_search: bool) -> SearchOutcome {
        let handle = match self.factory.get_client(&self.model, self.mode).await {
            Ok(handle) => handle,
            Err(e) => return SearchOutcome::failure(query, e.to_string()),
        };

        let capabilities = handle.client.capabilities();
        let degraded = use_search && !capabilities.supports_search;
        if degraded {
            info!(
                model = %self.model,
                protocol = handle.client.protocol_id(),
                "search requested but resolved client cannot ground"
            );
        }

        // The client owns the degrade-vs-refuse decision: a search-less
        // client answers from prior knowledge when degraded output is
        // allowed, and errs with SearchUnsupported when it is not.
        let result = match handle.client.search(query, use_search).await {
            Ok(result) => result,
            Err(e) => return SearchOutcome::failure(query, e.to_string()),
        };

        debug!(
            query,
            success = result.success,
            has_grounding = result.has_grounding,
            citations = result.citations.len(),
            "search outcome"
        );

        SearchOutcome {
            query: query.to_string(),
            text: result.text,
            citations: result.citations,
            search_queries: result.search_queries,
            has_grounding: result.has_grounding,
            degraded,
            success: result.success,
            error: result.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::registry::{ModelDescriptor, ModelRegistry};
    use std::time::Duration;

    #[tokio::test]
    async fn unknown_model_surfaces_as_failed_outcome() {
        let registry = Arc::new(ModelRegistry::empty());
        let factory = Arc::new(ClientFactory::new(
            registry,
            "test-key",
            Duration::from_secs(5),
            true,
        ));
        let agent = SearchAgent::new(factory, "ghost-model", ApiMode::Auto);

        let outcome = agent.search_with_grounding("anything", true).await;
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("ghost-model"));
        assert!(!outcome.has_grounding);
    }

    #[tokio::test]
    async fn disallowed_degradation_refuses_the_search() {
        let registry = Arc::new(ModelRegistry::empty());
        registry
            .register(ModelDescriptor::native("no-search-model", false))
            .unwrap();
        let factory = Arc::new(ClientFactory::new(
            registry,
            "test-key",
            Duration::from_secs(5),
            false,
        ));
        let agent = SearchAgent::new(factory, "no-search-model", ApiMode::Native);

        // The refusal fires before any request is dispatched.
        let outcome = agent.search_with_grounding("anything", true).await;
        assert!(!outcome.success);
        assert!(!outcome.has_grounding);
        assert!(outcome
            .error
            .as_deref()
            .unwrap()
            .contains("does not support grounded search"));
    }

    #[tokio::test]
    async fn plain_generation_never_trips_the_disallow_flag() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "plain answer"}]}}]
        });
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let registry = Arc::new(ModelRegistry::empty());
        registry
            .register(
                ModelDescriptor::native("no-search-model", false)
                    .with_base_url(server.uri())
                    .with_min_request_interval_ms(0),
            )
            .unwrap();
        let factory = Arc::new(ClientFactory::new(
            registry,
            "test-key",
            Duration::from_secs(5),
            false,
        ));
        let agent = SearchAgent::new(factory, "no-search-model", ApiMode::Native);

        // use_search = false asks for plain generation; the disallow policy
        // only applies to search requests.
        let outcome = agent.search_with_grounding("anything", false).await;
        assert!(outcome.success);
        assert!(!outcome.degraded);
        assert!(!outcome.has_grounding);
    }
}
