//! Deepdive - iterative deep-research orchestration
//!
//! Deepdive drives a multi-round "search, reflect, answer" research loop
//! against large-language-model providers, abstracting over two incompatible
//! protocols: a native SDK-style API with built-in web-grounded search, and a
//! generic HTTP chat-completions API without search. Callers get grounded
//! answers when the configured model can ground, and explicit degraded
//! results when it cannot.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): configuration, session state, and the
//!   provider capability port
//! - **Infrastructure Layer** (`infrastructure`): model registry, the two
//!   protocol clients, client factory/cache, config loading
//! - **Service Layer** (`services`): search normalization
//! - **Application Layer** (`application`): the research engine state machine
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use deepdive::application::ResearchEngine;
//! use deepdive::domain::models::ResearchConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = ResearchEngine::new(ResearchConfig::default(), api_key);
//!     let result = engine.run("what changed in Rust 1.83?").await;
//!     println!("{}", result.answer);
//! }
//! ```

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::ResearchEngine;
pub use domain::models::{
    ApiMode, CancelToken, EffortLevel, ResearchConfig, ResearchResult, ResearchStage,
    RoundRecord, StepEvent, StepStatus, TaskKind, TaskModels,
};
pub use domain::ports::{
    Capabilities, Citation, GenerationRequest, GenerationResult, ProviderClient, ProviderError,
};
pub use infrastructure::{
    ClientFactory, ClientHandle, ConfigError, ConfigLoader, FactoryError, ModelDescriptor,
    ModelRegistry, RegistryError,
};
pub use services::{SearchAgent, SearchOutcome};
