//! Research session state and result types.
//!
//! A [`ResearchSession`] is owned exclusively by one engine invocation and
//! accumulates round records across the search/reflect loop. It is never
//! shared across concurrent runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::services::search_agent::SearchOutcome;

/// Task classification produced by the analysis step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskComplexity {
    Simple,
    Medium,
    Complex,
}

impl Default for TaskComplexity {
    fn default() -> Self {
        // Fallback classification when the analysis call fails; the run must
        // never block on classification.
        Self::Medium
    }
}

/// Verdict of one reflection step, consumed immediately to decide the next
/// transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectionVerdict {
    /// Findings are incomplete; continue with these follow-up queries
    ContinueWith(Vec<String>),

    /// Accumulated findings answer the original query
    Sufficient,

    /// The reflection call itself failed
    Failed,
}

/// One search round: sub-queries issued, outcomes obtained, and the verdict
/// that closed the round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round number
    pub round: u32,

    /// Sub-queries issued this round
    pub sub_queries: Vec<String>,

    /// Normalized outcomes, one per sub-query
    pub outcomes: Vec<SearchOutcome>,

    /// Human-readable verdict summary ("sufficient", "continue", "failed")
    pub verdict: String,

    pub started_at: DateTime<Utc>,
}

impl RoundRecord {
    /// Number of outcomes in this round that came back degraded (answered
    /// without a live search).
    pub fn degraded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.degraded).count()
    }
}

/// Mutable state for one research invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: Uuid,

    /// The original user query
    pub query: String,

    /// Classification from the analysis step
    pub complexity: TaskComplexity,

    /// Completed rounds, in order
    pub rounds: Vec<RoundRecord>,

    /// Running concatenation of successful findings text
    pub findings: String,

    /// Strictly increasing round counter, bounded by the effort ceiling
    pub round_counter: u32,

    /// Reflection failures observed across this session; never reset by a
    /// success in between
    pub reflection_failures: u32,

    pub started_at: DateTime<Utc>,
}

impl ResearchSession {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            complexity: TaskComplexity::default(),
            rounds: Vec::new(),
            findings: String::new(),
            round_counter: 0,
            reflection_failures: 0,
            started_at: Utc::now(),
        }
    }

    /// Append a successful outcome's text to the running findings.
    pub fn accumulate(&mut self, outcome: &SearchOutcome) {
        if outcome.success && !outcome.text.is_empty() {
            if !self.findings.is_empty() {
                self.findings.push_str("\n\n");
            }
            self.findings.push_str(&outcome.text);
        }
    }

    /// All citations across rounds, deduplicated by URL, insertion order kept.
    pub fn citations(&self) -> Vec<crate::domain::ports::Citation> {
        let mut seen = std::collections::HashSet::new();
        let mut citations = Vec::new();
        for round in &self.rounds {
            for outcome in &round.outcomes {
                for citation in &outcome.citations {
                    if seen.insert(citation.url.clone()) {
                        citations.push(citation.clone());
                    }
                }
            }
        }
        citations
    }

    /// Total degraded outcomes across all rounds.
    pub fn degraded_rounds(&self) -> usize {
        self.rounds.iter().map(RoundRecord::degraded_count).sum()
    }
}

/// Final result of a research run. Always returned, never raised; a degraded
/// or aborted run still carries whatever was accumulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResult {
    pub session_id: Uuid,
    pub query: String,

    /// Synthesized final answer (built from partial findings on abort)
    pub answer: String,

    pub rounds: Vec<RoundRecord>,

    /// Deduplicated citations across all rounds
    pub citations: Vec<crate::domain::ports::Citation>,

    pub elapsed_secs: f64,
    pub success: bool,

    /// True when the run ended early (cancellation or repeated reflection
    /// failure) and the answer covers only partial findings
    pub aborted: bool,

    /// Count of search outcomes answered without live grounding. Callers must
    /// report degraded runs rather than presenting them as grounded.
    pub degraded_searches: usize,

    pub error: Option<String>,
}

/// Engine states, emitted with every step event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStage {
    Classifying,
    Planning,
    Searching,
    Reflecting,
    Synthesizing,
    Done,
    Aborted,
}

impl std::fmt::Display for ResearchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Classifying => write!(f, "classifying"),
            Self::Planning => write!(f, "planning"),
            Self::Searching => write!(f, "searching"),
            Self::Reflecting => write!(f, "reflecting"),
            Self::Synthesizing => write!(f, "synthesizing"),
            Self::Done => write!(f, "done"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Status carried by a step event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

/// One state-transition notification. This stream is the only contract
/// surface external observers depend on; the engine does not persist events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEvent {
    pub session_id: Uuid,
    pub stage: ResearchStage,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,

    /// Free-form summary payload (round numbers, query counts, errors)
    pub detail: serde_json::Value,
}

/// Cooperative cancellation flag, checked at every suspension point.
///
/// Cheap to clone and safe to trip from another task; the engine never
/// interrupts an in-flight remote call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
