//! Domain models: configuration and session state.

pub mod config;
pub mod session;

pub use config::{ApiMode, CustomModel, EffortLevel, ResearchConfig, TaskKind, TaskModels};
pub use session::{
    CancelToken, ReflectionVerdict, ResearchResult, ResearchSession, ResearchStage, RoundRecord,
    StepEvent, StepStatus, TaskComplexity,
};
