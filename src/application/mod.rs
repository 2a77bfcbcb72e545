//! Application layer: the research run orchestration.

pub mod research_engine;

pub use research_engine::ResearchEngine;
