//! Service layer: search normalization over the provider abstraction.

pub mod search_agent;

pub use search_agent::{SearchAgent, SearchOutcome};
