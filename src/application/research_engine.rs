//! Research engine.
//!
//! Drives the multi-round state machine over one [`ResearchSession`]:
//! classify the task, plan sub-queries, execute search rounds, reflect on
//! accumulated findings, and synthesize the final answer. Rounds are strictly
//! sequential; reflection always observes a consistent snapshot of every
//! result from its own round and nothing from the next.
//!
//! The engine always returns a [`ResearchResult`], never an error: degraded
//! and aborted runs carry whatever partial findings exist.

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::models::{
    ApiMode, CancelToken, EffortLevel, ReflectionVerdict, ResearchConfig, ResearchResult,
    ResearchSession, ResearchStage, RoundRecord, StepEvent, StepStatus, TaskComplexity, TaskKind,
};
use crate::domain::ports::{GenerationRequest, GenerationResult};
use crate::infrastructure::factory::ClientFactory;
use crate::infrastructure::registry::{ModelDescriptor, ModelRegistry};
use crate::services::search_agent::SearchAgent;

/// Reflection failures tolerated per session before forcing synthesis.
const MAX_REFLECTION_FAILURES: u32 = 2;

/// Orchestrates one research run per invocation.
///
/// Cheap to share: concurrent runs own their sessions and share only the
/// registry and the factory cache.
pub struct ResearchEngine {
    config: ResearchConfig,
    factory: Arc<ClientFactory>,
    agent: SearchAgent,
    registry: Arc<ModelRegistry>,
    events: Option<mpsc::UnboundedSender<StepEvent>>,
}

impl ResearchEngine {
    /// Build an engine with the built-in model table plus any custom
    /// registrations carried by the configuration.
    pub fn new(config: ResearchConfig, api_key: impl Into<String>) -> Self {
        let registry = Arc::new(ModelRegistry::with_builtin_models());
        Self::with_registry(config, api_key, registry)
    }

    /// Build an engine over a caller-supplied registry.
    pub fn with_registry(
        config: ResearchConfig,
        api_key: impl Into<String>,
        registry: Arc<ModelRegistry>,
    ) -> Self {
        for custom in &config.custom_models {
            let descriptor = ModelDescriptor::from(custom.clone());
            if registry.register(descriptor).is_err() {
                warn!(model = %custom.id, "failed to register custom model");
            }
        }

        let factory = Arc::new(ClientFactory::new(
            Arc::clone(&registry),
            api_key,
            std::time::Duration::from_secs(config.request_timeout_secs),
            config.allow_degraded_search,
        ));
        let agent = SearchAgent::new(
            Arc::clone(&factory),
            config.models.search.clone(),
            config.mode,
        );

        Self { config, factory, agent, registry, events: None }
    }

    /// Model registry backing this engine.
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Subscribe to step events. The engine does not persist events; this
    /// stream is the only observer surface.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<StepEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Run a research session to completion.
    pub async fn run(&self, query: &str) -> ResearchResult {
        self.run_cancellable(query, CancelToken::new()).await
    }

    /// Run a research session with cooperative cancellation. The token is
    /// checked at every suspension point; an in-flight remote call is never
    /// interrupted.
    pub async fn run_cancellable(&self, query: &str, cancel: CancelToken) -> ResearchResult {
        let started = Instant::now();
        let mut session = ResearchSession::new(query);
        let effort = self.config.effort;

        info!(session_id = %session.id, effort = %effort, "research run started");

        // Classify. Failure falls back to the default classification; the run
        // never blocks on this step.
        self.emit(&session, ResearchStage::Classifying, StepStatus::Running, json!({}));
        session.complexity = self.classify(query).await;
        self.emit(
            &session,
            ResearchStage::Classifying,
            StepStatus::Completed,
            json!({"complexity": session.complexity}),
        );

        if cancel.is_cancelled() {
            return self.cancelled(session, started);
        }

        // Plan the initial sub-queries.
        self.emit(&session, ResearchStage::Planning, StepStatus::Running, json!({}));
        let mut sub_queries = self.plan(query, session.complexity, effort).await;
        self.emit(
            &session,
            ResearchStage::Planning,
            StepStatus::Completed,
            json!({"sub_queries": sub_queries}),
        );

        let mut aborted = false;
        let mut abort_error: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return self.cancelled(session, started);
            }

            session.round_counter += 1;
            let round_number = session.round_counter;
            self.emit(
                &session,
                ResearchStage::Searching,
                StepStatus::Running,
                json!({"round": round_number, "sub_queries": sub_queries}),
            );

            let mut record = RoundRecord {
                round: round_number,
                sub_queries: sub_queries.clone(),
                outcomes: Vec::new(),
                verdict: String::new(),
                started_at: chrono::Utc::now(),
            };

            for sub_query in &sub_queries {
                if cancel.is_cancelled() {
                    session.rounds.push(record);
                    return self.cancelled(session, started);
                }
                let outcome = self.agent.search_with_grounding(sub_query, true).await;
                session.accumulate(&outcome);
                record.outcomes.push(outcome);
            }

            self.emit(
                &session,
                ResearchStage::Searching,
                StepStatus::Completed,
                json!({
                    "round": round_number,
                    "successful": record.outcomes.iter().filter(|o| o.success).count(),
                    "degraded": record.degraded_count(),
                }),
            );

            // Round ceiling: exit to synthesis without a closing reflection.
            if round_number >= effort.max_rounds() {
                record.verdict = "max_rounds".to_string();
                session.rounds.push(record);
                break;
            }

            if cancel.is_cancelled() {
                session.rounds.push(record);
                return self.cancelled(session, started);
            }

            self.emit(
                &session,
                ResearchStage::Reflecting,
                StepStatus::Running,
                json!({"round": round_number}),
            );
            let verdict = self.reflect(&mut session).await;

            match verdict {
                ReflectionVerdict::Sufficient => {
                    record.verdict = "sufficient".to_string();
                    session.rounds.push(record);
                    self.emit(
                        &session,
                        ResearchStage::Reflecting,
                        StepStatus::Completed,
                        json!({"round": round_number, "verdict": "sufficient"}),
                    );
                    break;
                }
                ReflectionVerdict::ContinueWith(queries) => {
                    record.verdict = "continue".to_string();
                    session.rounds.push(record);
                    self.emit(
                        &session,
                        ResearchStage::Reflecting,
                        StepStatus::Completed,
                        json!({"round": round_number, "verdict": "continue", "follow_up": queries}),
                    );
                    sub_queries = if queries.is_empty() {
                        vec![query.to_string()]
                    } else {
                        queries.into_iter().take(effort.max_sub_queries()).collect()
                    };
                }
                ReflectionVerdict::Failed => {
                    record.verdict = "failed".to_string();
                    session.rounds.push(record);
                    self.emit(
                        &session,
                        ResearchStage::Reflecting,
                        StepStatus::Failed,
                        json!({"round": round_number, "failures": session.reflection_failures}),
                    );
                    // Forward progress over completeness: synthesize from
                    // whatever findings exist instead of reflecting again.
                    aborted = true;
                    abort_error = Some("reflection failed twice; synthesizing partial answer".to_string());
                    break;
                }
            }
        }

        if cancel.is_cancelled() {
            return self.cancelled(session, started);
        }

        // Synthesize the final answer from the full accumulated findings.
        self.emit(&session, ResearchStage::Synthesizing, StepStatus::Running, json!({}));
        let (answer, synth_error) = self.synthesize(&session).await;
        let success = !answer.is_empty();
        if synth_error.is_some() {
            aborted = true;
            abort_error = abort_error.or(synth_error);
        }

        let final_stage = if aborted { ResearchStage::Aborted } else { ResearchStage::Done };
        self.emit(
            &session,
            final_stage,
            if success { StepStatus::Completed } else { StepStatus::Failed },
            json!({"rounds": session.rounds.len(), "degraded_searches": session.degraded_rounds()}),
        );
        info!(
            session_id = %session.id,
            rounds = session.rounds.len(),
            aborted,
            "research run finished"
        );

        ResearchResult {
            session_id: session.id,
            query: session.query.clone(),
            answer,
            citations: session.citations(),
            degraded_searches: session.degraded_rounds(),
            rounds: session.rounds,
            elapsed_secs: started.elapsed().as_secs_f64(),
            success,
            aborted,
            error: abort_error,
        }
    }

    /// One generation call routed to the model assigned for a task kind.
    async fn generate_for_task(&self, task: TaskKind, prompt: String) -> GenerationResult {
        let model = self.config.models.for_task(task).to_string();
        let handle = match self.factory.get_client(&model, self.config.mode).await {
            Ok(handle) => handle,
            Err(e) => return GenerationResult::failure(e.to_string()),
        };

        let request = GenerationRequest::new(model, prompt)
            .with_max_output_tokens(task.max_output_tokens());
        handle.client.generate(request).await
    }

    async fn classify(&self, query: &str) -> TaskComplexity {
        let prompt = format!(
            "Classify the complexity of this research task as one of \
             \"simple\", \"medium\" or \"complex\".\n\nTask: {query}\n\n\
             Respond with JSON only: {{\"complexity\": \"...\"}}"
        );

        let result = self.generate_for_task(TaskKind::TaskAnalysis, prompt).await;
        if !result.success {
            warn!("classification call failed, using default");
            return TaskComplexity::default();
        }

        extract_json(&result.text)
            .and_then(|value| value.get("complexity").and_then(|c| c.as_str()).map(str::to_string))
            .and_then(|label| match label.as_str() {
                "simple" => Some(TaskComplexity::Simple),
                "medium" => Some(TaskComplexity::Medium),
                "complex" => Some(TaskComplexity::Complex),
                _ => None,
            })
            .unwrap_or_default()
    }

    async fn plan(
        &self,
        query: &str,
        complexity: TaskComplexity,
        effort: EffortLevel,
    ) -> Vec<String> {
        let count = effort.max_sub_queries();
        let prompt = format!(
            "Generate up to {count} distinct web search queries that together \
             cover this {complexity:?}-complexity research task.\n\n\
             Task: {query}\n\n\
             Respond with JSON only: {{\"queries\": [\"...\"]}}"
        );

        let result = self.generate_for_task(TaskKind::TaskAnalysis, prompt).await;
        if result.success {
            if let Some(queries) = extract_json(&result.text)
                .and_then(|value| value.get("queries").cloned())
                .and_then(|queries| serde_json::from_value::<Vec<String>>(queries).ok())
            {
                let queries: Vec<_> = queries
                    .into_iter()
                    .filter(|q| !q.is_empty())
                    .take(count)
                    .collect();
                if !queries.is_empty() {
                    return queries;
                }
            }
        }

        // Planning never blocks the run: degrade to the original query.
        warn!("query planning failed, falling back to the original query");
        vec![query.to_string()]
    }

    /// Review accumulated findings and decide the next transition.
    ///
    /// A failed call is retried once; the second failure in the same session
    /// yields `Failed`, which the caller turns into a forced synthesis rather
    /// than another reflection attempt.
    async fn reflect(&self, session: &mut ResearchSession) -> ReflectionVerdict {
        loop {
            let prompt = format!(
                "Original question: {}\n\nFindings so far:\n{}\n\n\
                 Do the findings sufficiently answer the question? Respond \
                 with JSON only: {{\"is_sufficient\": true/false, \
                 \"follow_up_queries\": [\"...\"]}}",
                session.query, session.findings
            );

            let result = self.generate_for_task(TaskKind::Reflection, prompt).await;
            if !result.success {
                session.reflection_failures += 1;
                warn!(
                    failures = session.reflection_failures,
                    "reflection call failed"
                );
                if session.reflection_failures >= MAX_REFLECTION_FAILURES {
                    return ReflectionVerdict::Failed;
                }
                continue; // single retry
            }

            let Some(parsed) = extract_json(&result.text) else {
                // Unparseable verdict: claim sufficiency to guarantee
                // forward progress instead of looping on a confused model.
                warn!("reflection response was not valid JSON, treating as sufficient");
                return ReflectionVerdict::Sufficient;
            };

            let is_sufficient = parsed
                .get("is_sufficient")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(true);
            if is_sufficient {
                return ReflectionVerdict::Sufficient;
            }

            let follow_up = parsed
                .get("follow_up_queries")
                .cloned()
                .and_then(|queries| serde_json::from_value::<Vec<String>>(queries).ok())
                .unwrap_or_default();
            return ReflectionVerdict::ContinueWith(follow_up);
        }
    }

    /// Compose the final answer; on total failure fall back to the raw
    /// findings so the caller always receives whatever was accumulated.
    async fn synthesize(&self, session: &ResearchSession) -> (String, Option<String>) {
        if session.findings.is_empty() {
            return (
                String::new(),
                Some("no findings were accumulated".to_string()),
            );
        }

        let prompt = format!(
            "Write a comprehensive answer to the question below using only \
             the research findings provided.\n\nQuestion: {}\n\n\
             Findings:\n{}",
            session.query, session.findings
        );

        let result = self.generate_for_task(TaskKind::AnswerSynthesis, prompt).await;
        if result.success && !result.text.is_empty() {
            (result.text, None)
        } else {
            let error = result
                .error
                .unwrap_or_else(|| "synthesis returned empty output".to_string());
            warn!(%error, "answer synthesis failed, returning raw findings");
            (session.findings.clone(), Some(error))
        }
    }

    fn cancelled(&self, session: ResearchSession, started: Instant) -> ResearchResult {
        info!(session_id = %session.id, "research run cancelled");
        self.emit(
            &session,
            ResearchStage::Aborted,
            StepStatus::Failed,
            json!({"reason": "cancelled"}),
        );

        let answer = session.findings.clone();
        ResearchResult {
            session_id: session.id,
            query: session.query.clone(),
            success: !answer.is_empty(),
            answer,
            citations: session.citations(),
            degraded_searches: session.degraded_rounds(),
            rounds: session.rounds,
            elapsed_secs: started.elapsed().as_secs_f64(),
            aborted: true,
            error: Some("cancelled by caller".to_string()),
        }
    }

    fn emit(
        &self,
        session: &ResearchSession,
        stage: ResearchStage,
        status: StepStatus,
        detail: serde_json::Value,
    ) {
        if let Some(sender) = &self.events {
            // A dropped receiver must not fail the run.
            let _ = sender.send(StepEvent {
                session_id: session.id,
                stage,
                status,
                timestamp: chrono::Utc::now(),
                detail,
            });
        }
    }
}

/// Lenient JSON extraction: strips code fences and trims to the outermost
/// object before parsing. Models frequently wrap JSON in markdown.
fn extract_json(text: &str) -> Option<serde_json::Value> {
    let cleaned = text.replace("```json", "").replace("```", "");
    let trimmed = cleaned.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}
