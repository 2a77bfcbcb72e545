//! Infrastructure layer: registry, provider clients, factory, config loading.

pub mod config;
pub mod factory;
pub mod providers;
pub mod registry;

pub use config::{ConfigError, ConfigLoader};
pub use factory::{ClientFactory, ClientHandle, ClientKey, FactoryError};
pub use registry::{ModelDescriptor, ModelRegistry, RegistryError};
