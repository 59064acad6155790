//! API client instances and the process-wide default slot.
//!
//! Every public entry point takes an `Option<&ApiClient>`. An explicit client
//! always wins; `None` falls back to the default installed by [`configure`],
//! or built from the environment on first use.

use std::sync::{Arc, RwLock};

use crate::cache::QueryCache;
use crate::config::ClientConfig;
use crate::diagnostics::{DiagnosticSink, TracingSink};
use crate::error::ConfigError;
use crate::http_client::HttpClient;
use crate::transport::Transport;

/// Transport, query cache and diagnostic sink bound together. Cloning is
/// cheap and clones share the cache.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<Transport>,
    cache: QueryCache,
    sink: Arc<dyn DiagnosticSink>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self::from_transport(Transport::new(config))
    }

    pub fn with_http_client(config: &ClientConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self::from_transport(Transport::with_http_client(config, http_client))
    }

    fn from_transport(transport: Transport) -> Self {
        Self {
            transport: Arc::new(transport),
            cache: QueryCache::new(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        ClientConfig::from_env().map(|config| Self::new(&config))
    }

    /// Replaces the validation diagnostic sink.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn sink(&self) -> &dyn DiagnosticSink {
        self.sink.as_ref()
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("transport", &self.transport)
            .field("cached_entries", &self.cache.len())
            .finish_non_exhaustive()
    }
}

static DEFAULT_CLIENT: RwLock<Option<ApiClient>> = RwLock::new(None);

/// Installs a default client built from `config` and returns it.
pub fn configure(config: ClientConfig) -> ApiClient {
    let client = ApiClient::new(&config);
    set_default_client(client.clone());
    client
}

pub fn set_default_client(client: ApiClient) {
    tracing::debug!(base_url = client.base_url(), "default API client configured");
    *DEFAULT_CLIENT
        .write()
        .expect("default client slot should not be poisoned") = Some(client);
}

/// Removes the default client. The next fallback reads the environment again.
pub fn reset_default_client() {
    DEFAULT_CLIENT
        .write()
        .expect("default client slot should not be poisoned")
        .take();
}

/// The default client, built from `RESTKIT_*` environment variables when
/// nothing was configured.
pub fn default_client() -> Result<ApiClient, ConfigError> {
    if let Some(client) = DEFAULT_CLIENT
        .read()
        .expect("default client slot should not be poisoned")
        .as_ref()
    {
        return Ok(client.clone());
    }

    let mut slot = DEFAULT_CLIENT
        .write()
        .expect("default client slot should not be poisoned");
    if let Some(client) = slot.as_ref() {
        return Ok(client.clone());
    }
    let client = ApiClient::from_env()?;
    tracing::debug!(base_url = client.base_url(), "default API client built from environment");
    *slot = Some(client.clone());
    Ok(client)
}

/// `client` when given, the default client otherwise.
pub fn resolve_client(client: Option<&ApiClient>) -> Result<ApiClient, ConfigError> {
    match client {
        Some(client) => Ok(client.clone()),
        None => default_client(),
    }
}
