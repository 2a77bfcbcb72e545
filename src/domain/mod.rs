//! Domain layer: pure models and port traits, no I/O.

pub mod models;
pub mod ports;
