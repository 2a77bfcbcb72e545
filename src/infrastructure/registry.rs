//! Model registry.
//!
//! Process-wide mapping from model identifier to its capability descriptor.
//! Readers run concurrently; registration takes the write lock only for the
//! single map mutation. Descriptors are immutable after registration and are
//! handed out by value.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::models::{ApiMode, CustomModel};

/// Default native-protocol base address (Gemini REST API).
pub const NATIVE_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default generic-protocol base address (OpenAI-compatible).
pub const GENERIC_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Static capability metadata for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,

    /// Preferred protocol; `Auto` defers to capability flags at resolution
    pub affinity: ApiMode,

    pub supports_search: bool,
    pub supports_tools: bool,

    /// Endpoint base address
    pub base_url: String,

    /// Default sampling temperature
    pub temperature: f32,

    /// Default output token ceiling
    pub max_output_tokens: u32,

    /// Extra per-model request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Minimum spacing between requests to this model's endpoint,
    /// overriding the protocol default when set
    #[serde(default)]
    pub min_request_interval_ms: Option<u64>,
}

impl ModelDescriptor {
    /// Descriptor for a native-protocol model at the default endpoint.
    pub fn native(id: impl Into<String>, supports_search: bool) -> Self {
        Self {
            id: id.into(),
            affinity: ApiMode::Native,
            supports_search,
            supports_tools: true,
            base_url: NATIVE_DEFAULT_BASE_URL.to_string(),
            temperature: 0.3,
            max_output_tokens: 8192,
            headers: HashMap::new(),
            min_request_interval_ms: None,
        }
    }

    /// Descriptor for a generic-protocol model at the default endpoint.
    pub fn generic(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            affinity: ApiMode::Generic,
            supports_search: false,
            supports_tools: false,
            base_url: GENERIC_DEFAULT_BASE_URL.to_string(),
            temperature: 0.3,
            max_output_tokens: 4096,
            headers: HashMap::new(),
            min_request_interval_ms: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_min_request_interval_ms(mut self, interval_ms: u64) -> Self {
        self.min_request_interval_ms = Some(interval_ms);
        self
    }
}

impl From<CustomModel> for ModelDescriptor {
    fn from(custom: CustomModel) -> Self {
        Self {
            id: custom.id,
            affinity: custom.mode,
            supports_search: custom.supports_search,
            supports_tools: custom.supports_tools,
            base_url: custom.base_url,
            temperature: custom.temperature.unwrap_or(0.3),
            max_output_tokens: custom.max_output_tokens.unwrap_or(4096),
            headers: HashMap::new(),
            min_request_interval_ms: custom.min_request_interval_ms,
        }
    }
}

/// Registry error types.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown model: '{0}' is not registered")]
    UnknownModel(String),

    #[error("registry lock poisoned")]
    Poisoned,
}

/// In-memory model registry.
pub struct ModelRegistry {
    models: RwLock<HashMap<String, ModelDescriptor>>,
}

impl ModelRegistry {
    /// Empty registry with no descriptors.
    pub fn empty() -> Self {
        Self { models: RwLock::new(HashMap::new()) }
    }

    /// Registry seeded with the built-in model table: the search-capable
    /// native flash model, the native analysis/answer models, and a generic
    /// OpenAI-compatible entry.
    pub fn with_builtin_models() -> Self {
        let registry = Self::empty();
        for descriptor in Self::builtin_models() {
            // Seeding an empty registry cannot fail.
            let _ = registry.register(descriptor);
        }
        registry
    }

    fn builtin_models() -> Vec<ModelDescriptor> {
        vec![
            ModelDescriptor::native("gemini-2.0-flash", true),
            ModelDescriptor::native("gemini-2.5-flash", false),
            ModelDescriptor::native("gemini-2.5-pro", false),
            ModelDescriptor::generic("gpt-4o"),
            ModelDescriptor::generic("gpt-4o-mini"),
        ]
    }

    /// Insert or overwrite a descriptor by identifier. Idempotent.
    pub fn register(&self, descriptor: ModelDescriptor) -> Result<(), RegistryError> {
        let mut models = self.models.write().map_err(|_| RegistryError::Poisoned)?;
        models.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    /// Look up a descriptor by identifier.
    pub fn resolve(&self, id: &str) -> Result<ModelDescriptor, RegistryError> {
        let models = self.models.read().map_err(|_| RegistryError::Poisoned)?;
        models
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownModel(id.to_string()))
    }

    /// All registered descriptors, sorted by identifier for stable output.
    pub fn list(&self) -> Vec<ModelDescriptor> {
        let models = match self.models.read() {
            Ok(models) => models,
            Err(_) => return Vec::new(),
        };
        let mut all: Vec<_> = models.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_builtin_models()
    }
}
