//! Client configuration and the per-client context shared by its calls.

use crate::base::neterror::NetError;
use crate::interceptor::Interceptor;
use crate::transport::{ConnectionFactory, TransportOptions};
use crate::urlrequest::delivery::Delivery;
use crate::urlrequest::dispatcher::Dispatcher;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Default number of enqueued calls running at once.
pub const DEFAULT_MAX_RUNNING: usize = 6;
/// Default connect and read timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Configuration options for a client.
///
/// Every field has a default, so a JSON document only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// URL that request paths are resolved against.
    pub base_url: String,

    /// User-Agent sent when a request does not set one.
    pub user_agent: String,

    /// Maximum enqueued calls running concurrently.
    pub max_running: usize,

    /// Negotiate gzip transparently.
    pub gzip_enabled: bool,

    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,

    /// Disk cache settings (None disables the cache stage).
    pub cache: Option<CacheConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_agent: default_user_agent(),
            max_running: DEFAULT_MAX_RUNNING,
            gzip_enabled: false,
            connect_timeout_ms: DEFAULT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_TIMEOUT_MS,
            cache: None,
        }
    }
}

impl ClientConfig {
    /// Load a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, NetError> {
        serde_json::from_str(json).map_err(|e| NetError::InvalidConfig(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the `diskCache` folder.
    pub directory: PathBuf,

    /// Size budget in bytes.
    pub max_bytes: u64,

    /// Query parameter names left out of cache keys.
    #[serde(default)]
    pub ignored_query_names: Vec<String>,

    /// Answer only from the cache.
    #[serde(default)]
    pub force_cached: bool,
}

pub fn default_user_agent() -> String {
    format!("netpipe/{}", env!("CARGO_PKG_VERSION"))
}

/// What every call of one client shares: the assembled stage list, the
/// dispatcher, the transport factory and the listener delivery context.
pub struct RequestContext {
    stages: Vec<Arc<dyn Interceptor>>,
    dispatcher: Arc<Dispatcher>,
    connections: Arc<dyn ConnectionFactory>,
    transport: TransportOptions,
    delivery: Arc<dyn Delivery>,
}

impl RequestContext {
    pub(crate) fn new(
        stages: Vec<Arc<dyn Interceptor>>,
        dispatcher: Arc<Dispatcher>,
        connections: Arc<dyn ConnectionFactory>,
        transport: TransportOptions,
        delivery: Arc<dyn Delivery>,
    ) -> Self {
        Self {
            stages,
            dispatcher,
            connections,
            transport,
            delivery,
        }
    }

    /// The pipeline, head stages first and the connect stage last.
    pub fn stages(&self) -> &[Arc<dyn Interceptor>] {
        &self.stages
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn connections(&self) -> &Arc<dyn ConnectionFactory> {
        &self.connections
    }

    pub fn transport(&self) -> &TransportOptions {
        &self.transport
    }

    pub fn delivery(&self) -> &Arc<dyn Delivery> {
        &self.delivery
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("stages", &self.stages.len())
            .field("max_running", &self.dispatcher.max_running())
            .field("transport", &self.transport)
            .finish()
    }
}
