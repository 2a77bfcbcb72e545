//! Ports: trait boundaries between the orchestration core and the outside.

pub mod provider;

pub use provider::{
    Capabilities, Citation, GenerationRequest, GenerationResult, ProviderClient, ProviderError,
};
