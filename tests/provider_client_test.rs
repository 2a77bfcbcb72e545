//! Provider client integration tests against mock HTTP servers.

use std::time::Duration;

use deepdive::domain::ports::{GenerationRequest, ProviderClient, ProviderError};
use deepdive::infrastructure::providers::{GeminiClient, OpenAiCompatClient};
use deepdive::infrastructure::registry::ModelDescriptor;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn native_descriptor(base_url: &str, supports_search: bool) -> ModelDescriptor {
    ModelDescriptor::native("gemini-2.0-flash", supports_search)
        .with_base_url(base_url)
        .with_min_request_interval_ms(0)
}

fn generic_descriptor(base_url: &str) -> ModelDescriptor {
    ModelDescriptor::generic("gpt-4o")
        .with_base_url(base_url)
        .with_min_request_interval_ms(0)
}

fn chat_response(text: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }]
    })
}

#[tokio::test]
async fn gemini_grounded_search_normalizes_citations() {
    let server = MockServer::start().await;

    let grounded = serde_json::json!({
        "candidates": [{
            "content": {"parts": [{"text": "Rust 1.83 stabilized several const features."}]},
            "finishReason": "STOP",
            "groundingMetadata": {
                "webSearchQueries": ["rust 1.83 release notes"],
                "groundingChunks": [
                    {"web": {"title": "blog.rust-lang.org", "uri": "https://blog.rust-lang.org/1.83"}},
                    {"web": {"title": "github.com", "uri": "https://github.com/rust-lang/rust"}}
                ],
                "groundingSupports": [
                    {"segment": {"startIndex": 0, "endIndex": 40}, "groundingChunkIndices": [0, 1]}
                ]
            }
        }]
    });

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .and(body_string_contains("google_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&grounded))
        .mount(&server)
        .await;

    let client = GeminiClient::new(
        native_descriptor(&server.uri(), true),
        "test-key".to_string(),
        Duration::from_secs(10),
        true,
    )
    .unwrap();

    let result = client.search("what changed in rust 1.83", true).await.unwrap();

    assert!(result.success);
    assert!(result.has_grounding);
    assert_eq!(result.search_queries, vec!["rust 1.83 release notes"]);
    assert_eq!(result.citations.len(), 2);
    assert_eq!(result.citations[0].url, "https://blog.rust-lang.org/1.83");
    // File-extension-style titles are cleaned.
    assert_eq!(result.citations[0].title, "blog");
}

#[tokio::test]
async fn gemini_plain_generation_has_no_grounding() {
    let server = MockServer::start().await;

    let plain = serde_json::json!({
        "candidates": [{
            "content": {"parts": [{"text": "plain answer"}]},
            "finishReason": "STOP"
        }]
    });

    Mock::given(method("POST"))
        .and(path("/models/gemini-2.0-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&plain))
        .mount(&server)
        .await;

    let client = GeminiClient::new(
        native_descriptor(&server.uri(), true),
        "test-key".to_string(),
        Duration::from_secs(10),
        true,
    )
    .unwrap();

    let result = client
        .generate(GenerationRequest::new("gemini-2.0-flash", "hello"))
        .await;

    assert!(result.success);
    assert_eq!(result.text, "plain answer");
    assert!(!result.has_grounding);
    assert!(result.search_queries.is_empty());
}

#[tokio::test]
async fn gemini_server_error_is_carried_not_raised() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .mount(&server)
        .await;

    let client = GeminiClient::new(
        native_descriptor(&server.uri(), true),
        "test-key".to_string(),
        Duration::from_secs(10),
        true,
    )
    .unwrap();

    let result = client
        .generate(GenerationRequest::new("gemini-2.0-flash", "hello"))
        .await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("500"));
    // One initial attempt plus exactly one retry.
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn gemini_recovers_after_single_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let ok = serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": "recovered"}]}}]
    });
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&ok))
        .mount(&server)
        .await;

    let client = GeminiClient::new(
        native_descriptor(&server.uri(), true),
        "test-key".to_string(),
        Duration::from_secs(10),
        true,
    )
    .unwrap();

    let result = client
        .generate(GenerationRequest::new("gemini-2.0-flash", "hello"))
        .await;

    assert!(result.success);
    assert_eq!(result.text, "recovered");
}

#[tokio::test]
async fn openai_compat_generation_parses_first_choice() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&chat_response("generic answer")))
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new(
        generic_descriptor(&server.uri()),
        "test-key".to_string(),
        Duration::from_secs(10),
        true,
    )
    .unwrap();

    let result = client.generate(GenerationRequest::new("gpt-4o", "hello")).await;

    assert!(result.success);
    assert_eq!(result.text, "generic answer");
    assert!(!result.has_grounding);
}

#[tokio::test]
async fn openai_compat_search_is_degraded_but_successful() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(&chat_response("from prior knowledge")),
        )
        .mount(&server)
        .await;

    let client = OpenAiCompatClient::new(
        generic_descriptor(&server.uri()),
        "test-key".to_string(),
        Duration::from_secs(10),
        true,
    )
    .unwrap();

    let result = client.search("latest rust release", true).await.unwrap();

    assert!(result.success);
    assert!(!result.has_grounding);
    assert!(result.citations.is_empty());
    assert!(result.search_queries.is_empty());
}

#[tokio::test]
async fn openai_compat_search_refused_when_degradation_disallowed() {
    let server = MockServer::start().await;

    let client = OpenAiCompatClient::new(
        generic_descriptor(&server.uri()),
        "test-key".to_string(),
        Duration::from_secs(10),
        false,
    )
    .unwrap();

    let err = client.search("latest rust release", true).await.err().unwrap();
    assert!(matches!(err, ProviderError::SearchUnsupported { .. }));
    // Refusal happens before any request is dispatched.
    assert!(server.received_requests().await.unwrap().is_empty());
}
