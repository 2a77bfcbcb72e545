//! Research run configuration.
//!
//! An explicit value passed into the engine at construction. The engine never
//! reads ambient global state during a run, so concurrent runs with different
//! configurations cannot interfere.

use serde::{Deserialize, Serialize};

/// Which provider protocol to use for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiMode {
    /// Native protocol with built-in web-grounded search
    Native,

    /// Generic HTTP chat-completions protocol, no search
    Generic,

    /// Resolve per model descriptor at client construction time
    Auto,
}

impl std::fmt::Display for ApiMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Generic => write!(f, "generic"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Coarse round/sub-query budget for a research run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortLevel {
    Low,
    Medium,
    High,
}

impl EffortLevel {
    /// Hard ceiling on search rounds for this effort level.
    pub fn max_rounds(self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    /// Maximum sub-queries issued per round.
    pub fn max_sub_queries(self) -> usize {
        match self {
            Self::Low => 2,
            Self::Medium => 3,
            Self::High => 5,
        }
    }
}

impl std::fmt::Display for EffortLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// The distinct call sites a research run routes to models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Search,
    TaskAnalysis,
    Reflection,
    AnswerSynthesis,
}

impl TaskKind {
    /// Output token ceiling per task kind. The answer ceiling is deliberately
    /// large to avoid truncating long syntheses.
    pub fn max_output_tokens(self) -> u32 {
        match self {
            Self::Search => 8192,
            Self::TaskAnalysis => 4096,
            Self::Reflection => 8192,
            Self::AnswerSynthesis => 32_000,
        }
    }
}

/// Per-task model assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskModels {
    /// Model for grounded search rounds. Must be search-capable in native
    /// mode; the factory degrades with a warning otherwise.
    #[serde(default = "default_search_model")]
    pub search: String,

    /// Model for task classification and sub-query planning
    #[serde(default = "default_analysis_model")]
    pub task_analysis: String,

    /// Model for reflection over accumulated findings
    #[serde(default = "default_analysis_model")]
    pub reflection: String,

    /// Model for final answer synthesis (may be a stronger model)
    #[serde(default = "default_answer_model")]
    pub answer: String,
}

fn default_search_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_analysis_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_answer_model() -> String {
    "gemini-2.5-pro".to_string()
}

impl Default for TaskModels {
    fn default() -> Self {
        Self {
            search: default_search_model(),
            task_analysis: default_analysis_model(),
            reflection: default_analysis_model(),
            answer: default_answer_model(),
        }
    }
}

impl TaskModels {
    /// Model identifier for a task kind.
    pub fn for_task(&self, task: TaskKind) -> &str {
        match task {
            TaskKind::Search => &self.search,
            TaskKind::TaskAnalysis => &self.task_analysis,
            TaskKind::Reflection => &self.reflection,
            TaskKind::AnswerSynthesis => &self.answer,
        }
    }

    /// Route every non-search task to a single user-chosen model.
    /// Search stays on the search-capable default.
    pub fn from_user_model(user_model: impl Into<String>) -> Self {
        let user_model = user_model.into();
        Self {
            search: default_search_model(),
            task_analysis: user_model.clone(),
            reflection: user_model.clone(),
            answer: user_model,
        }
    }
}

/// A caller-supplied model registration merged into the registry at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CustomModel {
    pub id: String,

    /// Base address for the model's endpoint
    pub base_url: String,

    #[serde(default)]
    pub supports_search: bool,

    #[serde(default)]
    pub supports_tools: bool,

    /// Preferred protocol for this model
    #[serde(default = "default_custom_mode")]
    pub mode: ApiMode,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub max_output_tokens: Option<u32>,

    /// Minimum spacing between requests, overriding the protocol default
    #[serde(default)]
    pub min_request_interval_ms: Option<u64>,
}

fn default_custom_mode() -> ApiMode {
    ApiMode::Generic
}

/// Full configuration for one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResearchConfig {
    /// Protocol mode selector
    #[serde(default = "default_mode")]
    pub mode: ApiMode,

    /// Per-task model assignments
    #[serde(default)]
    pub models: TaskModels,

    /// Round/sub-query budget
    #[serde(default = "default_effort")]
    pub effort: EffortLevel,

    /// Per remote call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// When false, a search request against a model without search support
    /// fails with `SearchUnsupported` instead of degrading
    #[serde(default = "default_true")]
    pub allow_degraded_search: bool,

    /// Additional model registrations (identifier, base address, flags)
    #[serde(default)]
    pub custom_models: Vec<CustomModel>,
}

fn default_mode() -> ApiMode {
    ApiMode::Auto
}

fn default_effort() -> EffortLevel {
    EffortLevel::Medium
}

const fn default_timeout_secs() -> u64 {
    300
}

const fn default_true() -> bool {
    true
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            models: TaskModels::default(),
            effort: default_effort(),
            request_timeout_secs: default_timeout_secs(),
            allow_degraded_search: true,
            custom_models: Vec::new(),
        }
    }
}
