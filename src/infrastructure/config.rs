//! Configuration loading.
//!
//! Hierarchical merge: programmatic defaults, then `.deepdive/config.yaml`,
//! then `DEEPDIVE_*` environment variables. Validation runs at load time;
//! an invalid mode/model combination is fatal here, never mid-run.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::{ApiMode, ResearchConfig};

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("request_timeout_secs must be positive")]
    InvalidTimeout,

    #[error("custom model registration #{0} has an empty identifier")]
    EmptyCustomModelId(usize),

    #[error("custom model '{0}' has an empty base_url")]
    EmptyCustomModelBaseUrl(String),

    #[error(
        "generic mode with allow_degraded_search = false can never satisfy a \
         search request; enable degraded search or use native/auto mode"
    )]
    UnsatisfiableSearchPolicy,
}

/// Loads and validates [`ResearchConfig`].
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.deepdive/config.yaml` (project config)
    /// 3. Environment variables (`DEEPDIVE_*`, `__` as section separator)
    pub fn load() -> Result<ResearchConfig> {
        let config: ResearchConfig = Figment::new()
            .merge(Serialized::defaults(ResearchConfig::default()))
            .merge(Yaml::file(".deepdive/config.yaml"))
            .merge(Env::prefixed("DEEPDIVE_").split("__"))
            .extract()
            .context("failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load from a specific file, merged over defaults.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<ResearchConfig> {
        let config: ResearchConfig = Figment::new()
            .merge(Serialized::defaults(ResearchConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration after loading.
    pub fn validate(config: &ResearchConfig) -> Result<(), ConfigError> {
        if config.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        if config.mode == ApiMode::Generic && !config.allow_degraded_search {
            return Err(ConfigError::UnsatisfiableSearchPolicy);
        }

        for (index, custom) in config.custom_models.iter().enumerate() {
            if custom.id.is_empty() {
                return Err(ConfigError::EmptyCustomModelId(index));
            }
            if custom.base_url.is_empty() {
                return Err(ConfigError::EmptyCustomModelBaseUrl(custom.id.clone()));
            }
        }

        Ok(())
    }
}
