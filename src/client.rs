//! HTTP client with builder pattern.
//!
//! A [`Client`] owns one dispatcher, one optional disk cache and the stage
//! list every call runs through. Build it once and share it; clones are
//! cheap handles to the same client.
//!
//! # Example
//!
//! ```rust,ignore
//! use netpipe::{Client, Request};
//! use netpipe::parser::{StringParser, TypedRequest};
//!
//! let client = Client::builder("http://api.example.com/v1/")
//!     .max_running(4)
//!     .cache("/var/cache/app", 10 << 20)
//!     .build()?;
//!
//! let request = Request::builder().path("items").add("page", "1").build()?;
//! let text = client.fetch(TypedRequest::new(request, StringParser)).await?;
//! ```

use crate::base::neterror::NetError;
use crate::cache::{CacheInterceptor, DiskCache};
use crate::cookies::HeaderStore;
use crate::http::request::checked_url;
use crate::http::{Request, Response};
use crate::interceptor::{BridgeInterceptor, ConnectInterceptor, GzipInterceptor, Interceptor};
use crate::parser::{parse_response, ParserCallback, TypedRequest};
use crate::transport::{ConnectionFactory, HyperConnectionFactory, TransportOptions};
use crate::urlrequest::context::{default_user_agent, ClientConfig, RequestContext};
use crate::urlrequest::{Call, Delivery, Dispatcher, InlineDelivery};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

struct ClientInner {
    context: Arc<RequestContext>,
    base_url: String,
    cache: Option<DiskCache>,
    header_store: Option<Arc<dyn HeaderStore>>,
}

/// HTTP client issuing [`Call`]s.
///
/// Use [`Client::builder()`] to configure and create a client.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    /// Bind `request` to a new call. The request is frozen.
    pub fn new_call(&self, request: Request) -> Call {
        Call::new(self.inner.context.clone(), request)
    }

    /// Run `request` inline and return the raw response.
    pub async fn execute(&self, request: Request) -> Result<Response, NetError> {
        self.new_call(request).execute().await
    }

    /// Enqueue a typed request. Its listener, if any, is notified through
    /// the client's delivery context. The returned call can be canceled.
    pub fn send<T: Send + 'static>(&self, typed: TypedRequest<T>) -> Result<Call, NetError> {
        let (request, parser, listener) = typed.into_parts();
        let call = self.new_call(request);
        let callback = ParserCallback::new(parser, listener, self.inner.context.delivery().clone());
        call.enqueue(Arc::new(callback))?;
        Ok(call)
    }

    /// Run a typed request inline and parse the response. Anything but a
    /// 200 response with a body fails with [`NetError::Status`].
    pub async fn fetch<T>(&self, typed: TypedRequest<T>) -> Result<T, NetError> {
        let (request, parser, _) = typed.into_parts();
        let response = self.new_call(request).execute().await?;
        parse_response(parser.as_ref(), response).await
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.inner.context.dispatcher()
    }

    /// Remove waiting calls tagged `tag`.
    pub fn cancel_waiting(&self, tag: &str) -> usize {
        self.dispatcher().cancel_waiting(tag)
    }

    /// Cancel waiting and running calls tagged `tag`.
    pub fn cancel_tagged(&self, tag: &str) {
        self.dispatcher().cancel_tagged(tag)
    }

    /// Cancel every waiting and running call.
    pub fn cancel_all(&self) {
        self.dispatcher().cancel_all()
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn cache(&self) -> Option<&DiskCache> {
        self.inner.cache.as_ref()
    }

    pub fn header_store(&self) -> Option<&Arc<dyn HeaderStore>> {
        self.inner.header_store.as_ref()
    }

    pub fn context(&self) -> &Arc<RequestContext> {
        &self.inner.context
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .field("context", &self.inner.context)
            .field("cache", &self.inner.cache.is_some())
            .finish()
    }
}

/// Builder for creating a [`Client`].
pub struct ClientBuilder {
    base_url: String,
    user_agent: String,
    head: Vec<Arc<dyn Interceptor>>,
    tail: Vec<Arc<dyn Interceptor>>,
    connection_factory: Option<Arc<dyn ConnectionFactory>>,
    header_store: Option<Arc<dyn HeaderStore>>,
    delivery: Option<Arc<dyn Delivery>>,
    runtime: Option<Handle>,
    max_running: usize,
    connect_timeout: Duration,
    read_timeout: Duration,
    gzip: bool,
    cache: Option<(PathBuf, u64)>,
    ignored_query_names: Vec<String>,
    force_cached: bool,
}

impl ClientBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let defaults = ClientConfig::default();
        Self::from_config(&ClientConfig {
            base_url: base_url.into(),
            ..defaults
        })
    }

    /// Start from a loaded configuration.
    pub fn from_config(config: &ClientConfig) -> Self {
        let (cache, ignored_query_names, force_cached) = match &config.cache {
            Some(c) => (
                Some((c.directory.clone(), c.max_bytes)),
                c.ignored_query_names.clone(),
                c.force_cached,
            ),
            None => (None, Vec::new(), false),
        };
        Self {
            base_url: config.base_url.clone(),
            user_agent: config.user_agent.clone(),
            head: Vec::new(),
            tail: Vec::new(),
            connection_factory: None,
            header_store: None,
            delivery: None,
            runtime: None,
            max_running: config.max_running,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            gzip: config.gzip_enabled,
            cache,
            ignored_query_names,
            force_cached,
        }
    }

    /// Add a stage that runs before the bridging stage.
    pub fn add_head_interceptor(mut self, stage: impl Interceptor + 'static) -> Self {
        self.head.push(Arc::new(stage));
        self
    }

    /// Add a stage that runs after bridging (and after the cache stage).
    pub fn add_tail_interceptor(mut self, stage: impl Interceptor + 'static) -> Self {
        self.tail.push(Arc::new(stage));
        self
    }

    pub fn connection_factory(mut self, factory: impl ConnectionFactory + 'static) -> Self {
        self.connection_factory = Some(Arc::new(factory));
        self
    }

    pub fn header_store(mut self, store: Arc<dyn HeaderStore>) -> Self {
        self.header_store = Some(store);
        self
    }

    /// Where typed-request listeners are notified (inline by default).
    pub fn delivery(mut self, delivery: impl Delivery + 'static) -> Self {
        self.delivery = Some(Arc::new(delivery));
        self
    }

    /// Runtime enqueued calls are spawned on (the current one by default).
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn max_running(mut self, max: usize) -> Self {
        self.max_running = max;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn enable_gzip(mut self, enabled: bool) -> Self {
        self.gzip = enabled;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Enable the disk cache under `directory` with a budget of `max_bytes`.
    pub fn cache(mut self, directory: impl Into<PathBuf>, max_bytes: u64) -> Self {
        self.cache = Some((directory.into(), max_bytes));
        self
    }

    /// Query parameter names left out of cache keys.
    pub fn ignored_query_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_query_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Answer cacheable requests only from the cache.
    pub fn force_cached(mut self, force: bool) -> Self {
        self.force_cached = force;
        self
    }

    /// Validate the settings and assemble the client.
    pub fn build(self) -> Result<Client, NetError> {
        checked_url(&self.base_url)?;
        if self.max_running == 0 {
            return Err(NetError::InvalidConfig("max_running must be at least 1".into()));
        }
        if self.connect_timeout.is_zero() || self.read_timeout.is_zero() {
            return Err(NetError::InvalidConfig("timeouts must be positive".into()));
        }
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| {
                NetError::InvalidConfig("no tokio runtime supplied or running".into())
            })?,
        };
        let user_agent = if self.user_agent.is_empty() {
            default_user_agent()
        } else {
            self.user_agent
        };

        let cache = match self.cache {
            Some((directory, max_bytes)) => Some(DiskCache::open(directory, max_bytes)?),
            None => None,
        };

        let mut stages: Vec<Arc<dyn Interceptor>> = self.head;
        stages.push(Arc::new(BridgeInterceptor::new(
            self.base_url.clone(),
            user_agent,
            self.header_store.clone(),
        )));
        if let Some(cache) = &cache {
            stages.push(Arc::new(
                CacheInterceptor::new(cache.clone())
                    .base_url(self.base_url.clone())
                    .ignored_query_names(self.ignored_query_names)
                    .force_cached(self.force_cached),
            ));
        }
        stages.extend(self.tail);
        stages.push(Arc::new(GzipInterceptor::new(self.gzip)));
        stages.push(Arc::new(ConnectInterceptor));

        let context = RequestContext::new(
            stages,
            Arc::new(Dispatcher::new(self.max_running, runtime)),
            self.connection_factory
                .unwrap_or_else(|| Arc::new(HyperConnectionFactory)),
            TransportOptions {
                connect_timeout: self.connect_timeout,
                read_timeout: self.read_timeout,
            },
            self.delivery.unwrap_or_else(|| Arc::new(InlineDelivery)),
        );
        tracing::debug!(base_url = %self.base_url, ?context, "Client built");

        Ok(Client {
            inner: Arc::new(ClientInner {
                context: Arc::new(context),
                base_url: self.base_url,
                cache,
                header_store: self.header_store,
            }),
        })
    }
}
