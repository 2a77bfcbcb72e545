//! End-to-end research engine scenarios against mock provider endpoints.

use std::sync::Arc;

use deepdive::application::ResearchEngine;
use deepdive::domain::models::{
    ApiMode, CancelToken, EffortLevel, ResearchConfig, ResearchStage, StepStatus, TaskModels,
};
use deepdive::infrastructure::registry::{ModelDescriptor, ModelRegistry};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

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

fn gemini_response(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{"content": {"parts": [{"text": text}]}, "finishReason": "STOP"}]
    })
}

/// Engine wired to a single generic-protocol test model at the mock server.
fn generic_engine(server_uri: &str, effort: EffortLevel) -> ResearchEngine {
    let registry = Arc::new(ModelRegistry::empty());
    registry
        .register(
            ModelDescriptor::generic("test-gen")
                .with_base_url(server_uri)
                .with_min_request_interval_ms(0),
        )
        .unwrap();

    let config = ResearchConfig {
        mode: ApiMode::Generic,
        models: TaskModels {
            search: "test-gen".to_string(),
            task_analysis: "test-gen".to_string(),
            reflection: "test-gen".to_string(),
            answer: "test-gen".to_string(),
        },
        effort,
        request_timeout_secs: 10,
        allow_degraded_search: true,
        custom_models: vec![],
    };
    ResearchEngine::with_registry(config, "test-key", registry)
}

/// Mount the standard mocks for classification, planning and synthesis.
/// Specific matchers are mounted before any catch-all.
async fn mount_analysis_mocks(server: &MockServer, plan_queries: &[&str], answer: &str) {
    Mock::given(method("POST"))
        .and(body_string_contains("Classify the complexity"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(&chat_response(r#"{"complexity": "simple"}"#)),
        )
        .mount(server)
        .await;

    let plan = serde_json::json!({ "queries": plan_queries }).to_string();
    Mock::given(method("POST"))
        .and(body_string_contains("web search queries"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&chat_response(&plan)))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(body_string_contains("comprehensive answer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&chat_response(answer)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn low_effort_generic_run_is_single_round_and_degraded() {
    let server = MockServer::start().await;
    mount_analysis_mocks(&server, &["alpha query", "beta query"], "the final answer").await;

    // Catch-all: search sub-queries answered from prior knowledge.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&chat_response("search finding")))
        .mount(&server)
        .await;

    let engine = generic_engine(&server.uri(), EffortLevel::Low);
    let result = engine.run("what is the state of rust async?").await;

    assert!(result.success);
    assert!(!result.aborted);
    assert_eq!(result.rounds.len(), 1, "low effort is capped at one round");
    assert_eq!(result.rounds[0].sub_queries, vec!["alpha query", "beta query"]);
    assert_eq!(result.answer, "the final answer");

    // Generic protocol cannot ground: every outcome is explicitly degraded.
    assert_eq!(result.degraded_searches, 2);
    for outcome in &result.rounds[0].outcomes {
        assert!(outcome.success);
        assert!(outcome.degraded);
        assert!(!outcome.has_grounding);
    }
}

#[tokio::test]
async fn reflection_that_always_continues_stops_at_round_ceiling() {
    let server = MockServer::start().await;
    mount_analysis_mocks(&server, &["alpha query"], "bounded answer").await;

    Mock::given(method("POST"))
        .and(body_string_contains("is_sufficient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&chat_response(
            r#"{"is_sufficient": false, "follow_up_queries": ["gamma query"]}"#,
        )))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&chat_response("search finding")))
        .mount(&server)
        .await;

    let engine = generic_engine(&server.uri(), EffortLevel::Medium);
    let result = engine.run("an endless topic").await;

    assert!(result.success);
    assert_eq!(
        result.rounds.len(),
        EffortLevel::Medium.max_rounds() as usize,
        "round counter must never exceed the effort ceiling"
    );
    assert_eq!(result.rounds[0].verdict, "continue");
    assert_eq!(result.rounds[1].verdict, "max_rounds");
    assert_eq!(result.rounds[1].sub_queries, vec!["gamma query"]);
}

#[tokio::test]
async fn two_reflection_failures_force_partial_synthesis() {
    let server = MockServer::start().await;
    mount_analysis_mocks(&server, &["alpha query"], "partial answer from two rounds").await;

    // Round 1 reflection succeeds and asks for more.
    Mock::given(method("POST"))
        .and(body_string_contains("is_sufficient"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&chat_response(
            r#"{"is_sufficient": false, "follow_up_queries": ["delta query"]}"#,
        )))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // Every later reflection call fails hard.
    Mock::given(method("POST"))
        .and(body_string_contains("is_sufficient"))
        .respond_with(ResponseTemplate::new(500).set_body_string("reflection backend down"))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&chat_response("search finding")))
        .mount(&server)
        .await;

    // Three rounds allowed, but reflection dies in round 2.
    let engine = generic_engine(&server.uri(), EffortLevel::High);
    let result = engine.run("a query with flaky reflection").await;

    assert!(result.success, "partial results are a success, not a crash");
    assert!(result.aborted);
    assert_eq!(result.rounds.len(), 2, "no third round after two reflection failures");
    assert_eq!(result.rounds[1].verdict, "failed");
    assert_eq!(result.answer, "partial answer from two rounds");
    assert!(result.error.as_deref().unwrap().contains("reflection"));
}

#[tokio::test]
async fn native_mode_single_round_produces_grounded_answer() {
    let server = MockServer::start().await;

    let registry = Arc::new(ModelRegistry::empty());
    registry
        .register(
            ModelDescriptor::native("test-nat", true)
                .with_base_url(&server.uri())
                .with_min_request_interval_ms(0),
        )
        .unwrap();

    let config = ResearchConfig {
        mode: ApiMode::Native,
        models: TaskModels {
            search: "test-nat".to_string(),
            task_analysis: "test-nat".to_string(),
            reflection: "test-nat".to_string(),
            answer: "test-nat".to_string(),
        },
        effort: EffortLevel::Medium,
        request_timeout_secs: 10,
        allow_degraded_search: true,
        custom_models: vec![],
    };
    let engine = ResearchEngine::with_registry(config, "test-key", registry);

    let endpoint = "/models/test-nat:generateContent";

    Mock::given(method("POST"))
        .and(path(endpoint))
        .and(body_string_contains("Classify the complexity"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(&gemini_response(r#"{"complexity": "simple"}"#)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(endpoint))
        .and(body_string_contains("web search queries"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(&gemini_response(r#"{"queries": ["solo query"]}"#)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(endpoint))
        .and(body_string_contains("is_sufficient"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(&gemini_response(r#"{"is_sufficient": true}"#)),
        )
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(endpoint))
        .and(body_string_contains("comprehensive answer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&gemini_response("grounded final")))
        .mount(&server)
        .await;

    // The grounded search call carries the google_search tool declaration.
    let grounded = serde_json::json!({
        "candidates": [{
            "content": {"parts": [{"text": "fresh web finding"}]},
            "groundingMetadata": {
                "webSearchQueries": ["solo query expanded"],
                "groundingChunks": [
                    {"web": {"title": "example.com", "uri": "https://example.com/article"}}
                ],
                "groundingSupports": [{"groundingChunkIndices": [0]}]
            }
        }]
    });
    Mock::given(method("POST"))
        .and(path(endpoint))
        .and(body_string_contains("google_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&grounded))
        .mount(&server)
        .await;

    let result = engine.run("simple factual question").await;

    assert!(result.success);
    assert!(!result.aborted);
    assert_eq!(result.rounds.len(), 1);
    assert_eq!(result.rounds[0].verdict, "sufficient");
    assert_eq!(result.answer, "grounded final");
    assert_eq!(result.degraded_searches, 0);

    let outcome = &result.rounds[0].outcomes[0];
    assert!(outcome.has_grounding);
    assert!(!outcome.degraded);
    assert_eq!(outcome.search_queries, vec!["solo query expanded"]);
    assert_eq!(result.citations.len(), 1);
    assert_eq!(result.citations[0].url, "https://example.com/article");
}

#[tokio::test]
async fn cancellation_returns_partial_result_not_silence() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&chat_response("whatever")))
        .mount(&server)
        .await;

    let engine = generic_engine(&server.uri(), EffortLevel::Medium);
    let token = CancelToken::new();
    token.cancel();

    let result = engine.run_cancellable("cancelled before it starts", token).await;

    assert!(result.aborted);
    assert!(result.rounds.is_empty());
    assert_eq!(result.error.as_deref(), Some("cancelled by caller"));
}

#[tokio::test]
async fn step_events_trace_the_state_machine() {
    let server = MockServer::start().await;
    mount_analysis_mocks(&server, &["alpha query"], "observed answer").await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&chat_response("search finding")))
        .mount(&server)
        .await;

    let mut engine = generic_engine(&server.uri(), EffortLevel::Low);
    let mut events_rx = engine.subscribe();

    let result = engine.run("observable run").await;
    assert!(result.success);
    drop(engine);

    let mut events = vec![];
    while let Some(event) = events_rx.recv().await {
        events.push(event);
    }

    assert_eq!(events[0].stage, ResearchStage::Classifying);
    assert_eq!(events[0].status, StepStatus::Running);
    assert!(events.iter().all(|e| e.session_id == result.session_id));
    assert!(events.iter().any(|e| e.stage == ResearchStage::Searching));
    assert_eq!(events.last().unwrap().stage, ResearchStage::Done);
}
