//! Adapter configuration: environment, pass-through, hooks and listeners.
//!
//! # Design
//! Everything the legacy module kept as process-wide mutable statics lives
//! here instead. Build an `AdapterConfig` once at start-up with
//! `AdapterConfig::builder`, share it as `Arc<AdapterConfig>`, and treat it as
//! read-only afterwards. Adapters only ever read from it.

use std::fmt;
use std::sync::Arc;

use crate::adapter::Adapter;
use crate::deferred::RequestHandle;
use crate::error::TransportError;
use crate::http::{NativeResponse, TransportEvent};
use crate::options::RequestOptions;
use crate::transport::Transport;

/// Runs before every dispatch; may return replacement options.
pub type BeforeRequestHook = Arc<dyn Fn(&RequestOptions) -> Option<RequestOptions> + Send + Sync>;

/// Observes every transport completion before the handle settles.
pub type AfterRequestHook =
    Arc<dyn Fn(Option<&TransportError>, Option<&NativeResponse>) + Send + Sync>;

/// Tap on a named transport event of every native request.
pub type EventListener = Arc<dyn Fn(&Adapter, &TransportEvent) + Send + Sync>;

/// Where the adapter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Browser,
    Server,
}

impl Environment {
    /// `Browser` when compiled for wasm32, `Server` otherwise.
    pub fn detect() -> Self {
        if cfg!(target_arch = "wasm32") {
            Environment::Browser
        } else {
            Environment::Server
        }
    }

    pub fn is_browser(&self) -> bool {
        matches!(self, Environment::Browser)
    }
}

/// An existing ajax implementation requests are forwarded to in pass-through
/// mode.
pub trait AjaxPassThrough: Send + Sync {
    fn ajax(&self, options: RequestOptions) -> RequestHandle;
}

impl<F> AjaxPassThrough for F
where
    F: Fn(RequestOptions) -> RequestHandle + Send + Sync,
{
    fn ajax(&self, options: RequestOptions) -> RequestHandle {
        self(options)
    }
}

/// Shared, read-only adapter configuration.
pub struct AdapterConfig {
    environment: Environment,
    use_pass_through_if_browser: bool,
    pass_through: Option<Arc<dyn AjaxPassThrough>>,
    transport: Arc<dyn Transport>,
    before_request: Option<BeforeRequestHook>,
    after_request: Option<AfterRequestHook>,
    event_listeners: Vec<(String, EventListener)>,
}

impl AdapterConfig {
    pub fn builder<T>(transport: T) -> AdapterConfigBuilder
    where
        T: Transport + 'static,
    {
        AdapterConfigBuilder::new(Arc::new(transport))
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn use_pass_through_if_browser(&self) -> bool {
        self.use_pass_through_if_browser
    }

    /// True when dispatches go to the pass-through instead of the transport.
    pub fn passes_through(&self) -> bool {
        self.environment.is_browser() && self.use_pass_through_if_browser
    }

    pub fn pass_through(&self) -> Option<&Arc<dyn AjaxPassThrough>> {
        self.pass_through.as_ref()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn before_request(&self) -> Option<&BeforeRequestHook> {
        self.before_request.as_ref()
    }

    pub fn after_request(&self) -> Option<&AfterRequestHook> {
        self.after_request.as_ref()
    }

    /// Registered listeners in registration order, one per event name.
    pub fn event_listeners(&self) -> &[(String, EventListener)] {
        &self.event_listeners
    }
}

impl fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events: Vec<&str> = self.event_listeners.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("AdapterConfig")
            .field("environment", &self.environment)
            .field("use_pass_through_if_browser", &self.use_pass_through_if_browser)
            .field("pass_through", &self.pass_through.is_some())
            .field("before_request", &self.before_request.is_some())
            .field("after_request", &self.after_request.is_some())
            .field("event_listeners", &events)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AdapterConfig`].
pub struct AdapterConfigBuilder {
    config: AdapterConfig,
}

impl AdapterConfigBuilder {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            config: AdapterConfig {
                environment: Environment::detect(),
                use_pass_through_if_browser: true,
                pass_through: None,
                transport,
                before_request: None,
                after_request: None,
                event_listeners: Vec::new(),
            },
        }
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.config.environment = environment;
        self
    }

    pub fn use_pass_through_if_browser(mut self, enabled: bool) -> Self {
        self.config.use_pass_through_if_browser = enabled;
        self
    }

    pub fn pass_through<P>(mut self, pass_through: P) -> Self
    where
        P: AjaxPassThrough + 'static,
    {
        self.config.pass_through = Some(Arc::new(pass_through));
        self
    }

    pub fn before_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestOptions) -> Option<RequestOptions> + Send + Sync + 'static,
    {
        self.config.before_request = Some(Arc::new(hook));
        self
    }

    pub fn after_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&TransportError>, Option<&NativeResponse>) + Send + Sync + 'static,
    {
        self.config.after_request = Some(Arc::new(hook));
        self
    }

    /// Listen for `event` on every native request. A second listener for the
    /// same event replaces the first.
    pub fn event_listener<F>(mut self, event: &str, listener: F) -> Self
    where
        F: Fn(&Adapter, &TransportEvent) + Send + Sync + 'static,
    {
        let listener: EventListener = Arc::new(listener);
        let listeners = &mut self.config.event_listeners;
        match listeners.iter_mut().find(|(name, _)| *name == event) {
            Some(entry) => entry.1 = listener,
            None => listeners.push((event.to_string(), listener)),
        }
        self
    }

    /// Listen for the `request` event, fired when a request is sent.
    pub fn on_request_sent<F>(self, listener: F) -> Self
    where
        F: Fn(&Adapter, &TransportEvent) + Send + Sync + 'static,
    {
        self.event_listener("request", listener)
    }

    /// Listen for the `response` event, fired when response headers arrive.
    pub fn on_response<F>(self, listener: F) -> Self
    where
        F: Fn(&Adapter, &TransportEvent) + Send + Sync + 'static,
    {
        self.event_listener("response", listener)
    }

    pub fn build(self) -> Arc<AdapterConfig> {
        Arc::new(self.config)
    }
}
