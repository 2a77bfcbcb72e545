//! Client factory and cache.
//!
//! Resolves (model, requested mode) to a concrete provider client, applying
//! the AUTO policy, and reuses instances keyed by
//! (model, resolved mode, endpoint, credential fingerprint). Construction is
//! serialized under the cache lock so concurrent first-use of a key can never
//! build duplicate handles.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::models::ApiMode;
use crate::domain::ports::{ProviderClient, ProviderError};
use crate::infrastructure::providers::{GeminiClient, OpenAiCompatClient};
use crate::infrastructure::registry::{ModelDescriptor, ModelRegistry, RegistryError};

/// Factory error types. All of these are fatal at construction time; once a
/// handle exists, remote failures are carried inside results instead.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// Cache key identifying one constructed client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub model: String,

    /// Resolved mode, never `Auto`
    pub mode: ApiMode,

    pub endpoint: String,

    /// Stable hash of the credential, never the credential itself
    pub key_fingerprint: u64,
}

/// A resolved, cached provider client bound to one
/// (model, protocol, credential, endpoint) tuple.
///
/// Cheap to clone; the client is shared read-only by concurrent callers and
/// evicted only by explicit cache invalidation.
#[derive(Clone)]
pub struct ClientHandle {
    pub client: Arc<dyn ProviderClient>,
    pub key: ClientKey,

    /// Recorded when an explicitly requested mode conflicted with the model's
    /// protocol affinity and the factory degraded instead of failing
    pub warning: Option<String>,
}

impl ClientHandle {
    /// Resolved protocol mode for this handle.
    pub fn mode(&self) -> ApiMode {
        self.key.mode
    }
}

/// Constructs and caches provider clients.
pub struct ClientFactory {
    registry: Arc<ModelRegistry>,
    api_key: String,
    timeout: Duration,
    allow_degraded_search: bool,
    cache: Mutex<HashMap<ClientKey, Arc<dyn ProviderClient>>>,
}

impl ClientFactory {
    pub fn new(
        registry: Arc<ModelRegistry>,
        api_key: impl Into<String>,
        timeout: Duration,
        allow_degraded_search: bool,
    ) -> Self {
        Self {
            registry,
            api_key: api_key.into(),
            timeout,
            allow_degraded_search,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a model and requested mode to a cached or freshly constructed
    /// client handle.
    ///
    /// A cache hit returns the existing instance; a miss constructs one while
    /// holding the cache lock, so no key is ever constructed twice.
    pub async fn get_client(
        &self,
        model: &str,
        requested_mode: ApiMode,
    ) -> Result<ClientHandle, FactoryError> {
        let descriptor = self.registry.resolve(model)?;
        let (mode, warning) = resolve_mode(&descriptor, requested_mode);

        if let Some(message) = &warning {
            warn!(model, requested = %requested_mode, resolved = %mode, "{message}");
        }

        let key = ClientKey {
            model: descriptor.id.clone(),
            mode,
            endpoint: descriptor.base_url.clone(),
            key_fingerprint: fingerprint(&self.api_key),
        };

        let mut cache = self.cache.lock().await;
        if let Some(client) = cache.get(&key) {
            debug!(model, mode = %mode, "client cache hit");
            return Ok(ClientHandle { client: Arc::clone(client), key, warning });
        }

        let client = self.construct(descriptor, mode)?;
        cache.insert(key.clone(), Arc::clone(&client));
        debug!(model, mode = %mode, "client constructed and cached");

        Ok(ClientHandle { client, key, warning })
    }

    /// Construct a client for the resolved mode. Pure object assembly, no I/O.
    fn construct(
        &self,
        descriptor: ModelDescriptor,
        mode: ApiMode,
    ) -> Result<Arc<dyn ProviderClient>, FactoryError> {
        let build = |error: ProviderError| FactoryError::InvalidConfig(error.to_string());

        match mode {
            ApiMode::Native => {
                let client = GeminiClient::new(
                    descriptor,
                    self.api_key.clone(),
                    self.timeout,
                    self.allow_degraded_search,
                )
                .map_err(build)?;
                Ok(Arc::new(client))
            }
            ApiMode::Generic => {
                let client = OpenAiCompatClient::new(
                    descriptor,
                    self.api_key.clone(),
                    self.timeout,
                    self.allow_degraded_search,
                )
                .map_err(build)?;
                Ok(Arc::new(client))
            }
            ApiMode::Auto => unreachable!("mode is resolved before construction"),
        }
    }

    /// Drop one cached client.
    pub async fn invalidate(&self, key: &ClientKey) {
        self.cache.lock().await.remove(key);
    }

    /// Drop every cached client.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    /// Number of cached clients.
    pub async fn cached_count(&self) -> usize {
        self.cache.lock().await.len()
    }
}

/// Apply the AUTO policy and the conflict rule.
///
/// AUTO picks native when the descriptor prefers native, or when it is
/// auto-affine and search-capable. An explicit request that conflicts with a
/// fixed affinity degrades to the affinity with a recorded warning; a hard
/// failure here would make every mixed-model configuration unusable.
fn resolve_mode(descriptor: &ModelDescriptor, requested: ApiMode) -> (ApiMode, Option<String>) {
    match requested {
        ApiMode::Auto => {
            let mode = match descriptor.affinity {
                ApiMode::Native => ApiMode::Native,
                ApiMode::Generic => ApiMode::Generic,
                ApiMode::Auto if descriptor.supports_search => ApiMode::Native,
                ApiMode::Auto => ApiMode::Generic,
            };
            (mode, None)
        }
        explicit => {
            if descriptor.affinity == ApiMode::Auto || descriptor.affinity == explicit {
                (explicit, None)
            } else {
                let warning = format!(
                    "model '{}' only speaks the {} protocol; {} was requested, degrading",
                    descriptor.id, descriptor.affinity, explicit
                );
                (descriptor.affinity, Some(warning))
            }
        }
    }
}

/// Stable 64-bit fingerprint of the credential for cache keying.
fn fingerprint(api_key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    api_key.hash(&mut hasher);
    hasher.finish()
}
