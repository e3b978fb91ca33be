//! The request adapter: jQuery-ajax options in, promise-like handle out.
//!
//! # Design
//! One `Adapter` drives at most one request at a time. `dispatch` either
//! forwards the options to the configured pass-through, or builds a
//! `NativeRequest` from them, hands it to the transport and returns a
//! `RequestHandle` straight away. The transport's completion normalizes the
//! response onto the handle and settles it exactly once.
//!
//! State shared with the completion sits behind a mutex that is never held
//! while calling into the transport, hooks, listeners or callbacks, so a
//! transport may complete synchronously from inside `end`.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::AdapterConfig;
use crate::deferred::{CallbackContext, Deferred, ReadyState, RequestHandle, XhrFields};
use crate::error::{ContractError, TransportError};
use crate::http::{HttpMethod, NativeRequest, NativeResponse, ResponseShape};
use crate::options::{EffectiveSettings, RequestOptions};
use crate::query;
use crate::status;

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Idle,
    /// Claimed by a dispatch that has not reached the transport yet.
    Reserved,
    InFlight,
}

#[derive(Debug, Default)]
struct AdapterState {
    settings: Option<Arc<EffectiveSettings>>,
    request: Option<NativeRequest>,
    slot: Slot,
}

/// Dispatches one jQuery-ajax style request at a time.
#[derive(Debug, Clone)]
pub struct Adapter {
    id: Uuid,
    config: Arc<AdapterConfig>,
    state: Arc<Mutex<AdapterState>>,
}

/// Releases a reserved slot unless the dispatch reached the transport.
struct Reservation<'a> {
    state: &'a Mutex<AdapterState>,
    committed: bool,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.state.lock().slot = Slot::Idle;
        }
    }
}

impl Adapter {
    pub fn new(config: Arc<AdapterConfig>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            state: Arc::new(Mutex::new(AdapterState::default())),
        }
    }

    /// Identifier used in log records of this adapter.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Arc<AdapterConfig> {
        &self.config
    }

    /// Send a request described by jQuery-ajax style `options`.
    ///
    /// Returns `Ok(None)` without dispatching when this adapter already has a
    /// request in flight. Malformed options are reported as `ContractError`;
    /// failures of the request itself reject the returned handle instead.
    pub fn dispatch(&self, options: RequestOptions) -> Result<Option<RequestHandle>, ContractError> {
        for key in options.unsupported_options() {
            tracing::warn!(adapter = %self.id, option = %key, "option is not supported by requ");
        }

        if self.config.passes_through() {
            let options = self.invoke_before_request(options);
            let pass_through = self
                .config
                .pass_through()
                .ok_or(ContractError::PassThroughUnavailable)?;
            // The pass-through validates on its own; settings are recorded
            // only when the options merge cleanly.
            {
                let mut state = self.state.lock();
                state.settings = EffectiveSettings::from_options(&options).ok().map(Arc::new);
                state.request = None;
            }
            tracing::debug!(adapter = %self.id, "forwarding request to ajax pass-through");
            return Ok(Some(pass_through.ajax(options)));
        }

        let Some(reservation) = self.reserve() else {
            tracing::error!(adapter = %self.id, "request already in progress on this adapter");
            return Ok(None);
        };
        let options = self.invoke_before_request(options);
        self.dispatch_direct(options, reservation).map(Some)
    }

    fn dispatch_direct(
        &self,
        options: RequestOptions,
        mut reservation: Reservation<'_>,
    ) -> Result<RequestHandle, ContractError> {
        let mut settings = EffectiveSettings::from_options(&options)?;
        let method = settings.method;

        let mut request = self
            .config
            .transport()
            .request(method, &settings.url)
            .ok_or(ContractError::MethodNotSupportedByTransport(method))?;

        if let Some(data) = settings.data.as_ref().filter(|data| !data.is_empty()) {
            if method.has_body() {
                request.send(data);
            } else {
                settings.url = query::extend_url(&settings.url, data);
                request.query(data);
            }
        }

        if let Some(content_type) = &settings.content_type {
            request.set("Content-Type", content_type);
        }
        request.set("Accepts", settings.data_type.accepts());

        for (name, value) in &settings.headers {
            request.set(name, value);
        }
        // Keeps DELETE without a body from being sent chunked. Applied after
        // the caller headers so it always wins.
        if method == HttpMethod::Delete {
            settings
                .headers
                .retain(|name, _| !name.eq_ignore_ascii_case("content-length"));
            settings.headers.insert("Content-Length".to_string(), "0".to_string());
            request.set("Content-Length", "0");
        }

        self.bind_event_listeners(&mut request);

        let settings = Arc::new(settings);
        let context = match &settings.context {
            Some(value) => CallbackContext::Value(value.clone()),
            None => CallbackContext::Settings(Arc::clone(&settings)),
        };

        let deferred = Deferred::new();
        deferred.set_abort(request.abort_signal());
        let handle = deferred.promise();

        {
            let mut state = self.state.lock();
            state.settings = Some(Arc::clone(&settings));
            state.request = Some(request.clone());
            state.slot = Slot::InFlight;
        }
        reservation.committed = true;

        tracing::debug!(
            adapter = %self.id,
            method = %method,
            url = %settings.url,
            "dispatching request"
        );

        let completion = {
            let adapter = self.clone();
            let deferred = deferred.clone();
            crate::transport::Completion::new(move |error, response| {
                adapter.on_request_end(&deferred, context, error, response);
            })
        };
        self.config.transport().end(request, completion);

        attach_callbacks(&handle, &options);
        Ok(handle)
    }

    /// The settings of the last dispatch. On the pass-through path these are
    /// the forwarded options merged with defaults, when they are valid.
    pub fn settings(&self) -> Option<Arc<EffectiveSettings>> {
        self.state.lock().settings.clone()
    }

    /// The native request of the last direct dispatch.
    pub fn native_request(&self) -> Option<NativeRequest> {
        self.state.lock().request.clone()
    }

    /// The request URL including query parameters added for methods without
    /// a body. Recomputed on every call.
    pub fn full_url(&self) -> Option<String> {
        let state = self.state.lock();
        let request = state.request.as_ref()?;
        let url = match &state.settings {
            Some(settings) if settings.has_data() && !settings.method.has_body() => {
                match &settings.data {
                    Some(data) => query::extend_url(request.url(), data),
                    None => request.url().to_string(),
                }
            }
            _ => request.url().to_string(),
        };
        Some(url)
    }

    pub fn method(&self) -> Option<HttpMethod> {
        self.state.lock().settings.as_ref().map(|settings| settings.method)
    }

    /// The request body, only for methods that carry one.
    pub fn payload(&self) -> Option<Map<String, Value>> {
        let state = self.state.lock();
        let settings = state.settings.as_ref()?;
        if settings.method.has_body() && settings.has_data() {
            settings.data.clone()
        } else {
            None
        }
    }

    /// Whether a direct dispatch is waiting for its completion.
    pub fn is_in_flight(&self) -> bool {
        !matches!(self.state.lock().slot, Slot::Idle)
    }

    fn reserve(&self) -> Option<Reservation<'_>> {
        let mut state = self.state.lock();
        if !matches!(state.slot, Slot::Idle) {
            return None;
        }
        state.slot = Slot::Reserved;
        Some(Reservation {
            state: &self.state,
            committed: false,
        })
    }

    fn invoke_before_request(&self, options: RequestOptions) -> RequestOptions {
        match self.config.before_request() {
            Some(hook) => hook(&options).unwrap_or(options),
            None => options,
        }
    }

    fn bind_event_listeners(&self, request: &mut NativeRequest) {
        for (event, listener) in self.config.event_listeners() {
            let listener = Arc::clone(listener);
            let config = Arc::clone(&self.config);
            let state: Weak<Mutex<AdapterState>> = Arc::downgrade(&self.state);
            let id = self.id;
            request.on(event, move |transport_event| {
                if let Some(state) = state.upgrade() {
                    let adapter = Adapter {
                        id,
                        config: Arc::clone(&config),
                        state,
                    };
                    listener(&adapter, transport_event);
                }
            });
        }
    }

    fn on_request_end(
        &self,
        deferred: &Deferred,
        context: CallbackContext,
        error: Option<TransportError>,
        response: Option<NativeResponse>,
    ) {
        if let Some(hook) = self.config.after_request() {
            hook(error.as_ref(), response.as_ref());
        }

        deferred.update_response(|fields| {
            if let Some(response) = &response {
                apply_response(fields, response);
            }
            fields.ready_state = ReadyState::Done;
            fields.native_response = response.clone();
            fields.transport_error = error.clone();
        });
        let status = deferred.promise().status();

        self.state.lock().slot = Slot::Idle;

        tracing::debug!(
            adapter = %self.id,
            status = ?status,
            error = ?error,
            "request completed"
        );

        if let Some(error) = error {
            deferred.reject_with(context, Some(error));
        } else if status::is_error_status(status) {
            deferred.reject_with(context, None);
        } else {
            let body = response.map(|response| response.body).unwrap_or(Value::Null);
            deferred.resolve_with(context, body);
        }
    }
}

/// Send a request with a fresh adapter.
pub fn dispatch(
    config: &Arc<AdapterConfig>,
    options: RequestOptions,
) -> Result<Option<RequestHandle>, ContractError> {
    Adapter::new(Arc::clone(config)).dispatch(options)
}

fn attach_callbacks(handle: &RequestHandle, options: &RequestOptions) {
    let callbacks = &options.callbacks;
    if let Some(on_done) = callbacks.on_done() {
        let on_done = Arc::clone(on_done);
        handle.done(move |context, resolution| on_done(context, resolution));
    }
    if let Some(on_fail) = callbacks.on_fail() {
        let on_fail = Arc::clone(on_fail);
        handle.fail(move |context, rejection| on_fail(context, rejection));
    }
    if let Some(on_always) = callbacks.on_always() {
        let on_always = Arc::clone(on_always);
        handle.always(move |context, settlement| on_always(context, settlement));
    }
}

fn apply_response(fields: &mut XhrFields, response: &NativeResponse) {
    match &response.shape {
        ResponseShape::Plain(res) => {
            fields.status = Some(res.status_code);
            fields.status_text = status::status_text(res.status_code).to_string();
            fields.response_text = Some(res.text.clone());
            if response.body.is_null() {
                return;
            }
            let content_type = res.header("content-type").unwrap_or("");
            if content_type.contains("application/json") {
                fields.response_json = Some(response.body.clone());
            } else if content_type.contains("application/xml") || content_type.contains("text/xml") {
                fields.response_xml = Some(response.body.clone());
            }
        }
        ResponseShape::Xhr(xhr) => {
            fields.status = Some(xhr.status);
            fields.status_text = xhr.status_text.clone();
            fields.response_text = xhr.response_text.clone();
            fields.response_json = xhr.response_json.clone();
            fields.response_xml = xhr.response_xml.clone();
        }
    }
}
