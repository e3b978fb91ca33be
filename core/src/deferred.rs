//! Deferred and the promise-like `RequestHandle` it resolves.
//!
//! # Design
//! A `Deferred` settles exactly once, either resolved with a body or
//! rejected with an optional `TransportError`. Subscribers registered through
//! `done`, `fail` and `always` run in registration order with the context
//! the deferred was settled with; subscribing after settlement runs the
//! callback right away. Callbacks never run while an internal lock is held,
//! so they are free to inspect the handle or dispatch new requests.
//!
//! The handle also carries the jqXHR-like response fields (`status`,
//! `responseText`, ...), which the adapter fills in once at completion.
//! Settlement arguments that mention the handle are built on demand instead
//! of being stored, so the handle never owns a reference to itself.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde_json::Value;

use crate::error::TransportError;
use crate::http::{AbortSignal, NativeResponse};
use crate::options::EffectiveSettings;

/// Receiver the settlement callbacks run against.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackContext {
    /// The effective settings of the request (the default).
    Settings(Arc<EffectiveSettings>),
    /// The caller-supplied `context` option.
    Value(Value),
}

impl CallbackContext {
    pub fn settings(&self) -> Option<&EffectiveSettings> {
        match self {
            CallbackContext::Settings(settings) => Some(settings),
            CallbackContext::Value(_) => None,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            CallbackContext::Value(value) => Some(value),
            CallbackContext::Settings(_) => None,
        }
    }
}

/// `readyState` of the handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    #[default]
    Unsent = 0,
    Done = 4,
}

impl ReadyState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Second positional settlement argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStatus {
    Success,
    Error,
}

impl TextStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TextStatus::Success => "success",
            TextStatus::Error => "error",
        }
    }
}

/// jqXHR-like response fields of a handle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XhrFields {
    pub ready_state: ReadyState,
    pub status: Option<u16>,
    pub status_text: String,
    pub response_text: Option<String>,
    pub response_json: Option<Value>,
    pub response_xml: Option<Value>,
    /// The transport's response, whatever the outcome.
    pub native_response: Option<NativeResponse>,
    /// The transport's error, if the request failed at transport level.
    pub transport_error: Option<TransportError>,
}

/// Arguments of a resolved request: `(body, "success", handle)`.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub body: Value,
    pub text_status: TextStatus,
    pub handle: RequestHandle,
}

/// Arguments of a rejected request: `(handle, "error", error)`.
///
/// `error` is `None` when the request completed but its status was not 2xx
/// or 3xx.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub handle: RequestHandle,
    pub text_status: TextStatus,
    pub error: Option<TransportError>,
}

/// Either outcome, as seen by `always` subscribers and `wait`.
#[derive(Debug, Clone)]
pub enum Settlement {
    Resolved(Resolution),
    Rejected(Rejection),
}

impl Settlement {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Settlement::Resolved(_))
    }

    pub fn handle(&self) -> &RequestHandle {
        match self {
            Settlement::Resolved(resolution) => &resolution.handle,
            Settlement::Rejected(rejection) => &rejection.handle,
        }
    }

    pub fn text_status(&self) -> TextStatus {
        match self {
            Settlement::Resolved(resolution) => resolution.text_status,
            Settlement::Rejected(rejection) => rejection.text_status,
        }
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        match self {
            Settlement::Resolved(resolution) => Some(resolution),
            Settlement::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Settlement::Rejected(rejection) => Some(rejection),
            Settlement::Resolved(_) => None,
        }
    }
}

enum Outcome {
    Resolved(Value),
    Rejected(Option<TransportError>),
}

struct Settled {
    context: CallbackContext,
    outcome: Outcome,
}

enum Subscriber {
    Done(Box<dyn FnOnce(&CallbackContext, &Resolution) + Send>),
    Fail(Box<dyn FnOnce(&CallbackContext, &Rejection) + Send>),
    Always(Box<dyn FnOnce(&CallbackContext, &Settlement) + Send>),
}

enum State {
    Pending(Vec<Subscriber>),
    /// `drained` turns true once the subscribers pending at settlement ran.
    Settled { settled: Arc<Settled>, drained: bool },
}

struct Shared {
    state: Mutex<State>,
    settled: Condvar,
    fields: Mutex<XhrFields>,
    abort: Mutex<Option<AbortSignal>>,
}

/// Promise-like handle returned by `dispatch`.
#[derive(Clone)]
pub struct RequestHandle {
    shared: Arc<Shared>,
}

impl RequestHandle {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Pending(Vec::new())),
                settled: Condvar::new(),
                fields: Mutex::new(XhrFields::default()),
                abort: Mutex::new(None),
            }),
        }
    }

    /// Run `f` with `(body, "success", handle)` if the request resolves.
    pub fn done<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&CallbackContext, &Resolution) + Send + 'static,
    {
        self.subscribe(Subscriber::Done(Box::new(f)));
        self
    }

    /// Run `f` with `(handle, "error", error)` if the request rejects.
    pub fn fail<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&CallbackContext, &Rejection) + Send + 'static,
    {
        self.subscribe(Subscriber::Fail(Box::new(f)));
        self
    }

    /// Run `f` with the settlement, whichever way it goes.
    pub fn always<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&CallbackContext, &Settlement) + Send + 'static,
    {
        self.subscribe(Subscriber::Always(Box::new(f)));
        self
    }

    /// Block until the handle settles and its callbacks have run.
    ///
    /// Must not be called from one of this handle's own callbacks.
    pub fn wait(&self) -> Settlement {
        let mut guard = self.shared.state.lock();
        loop {
            if let Some(settled) = drained_of(&guard) {
                drop(guard);
                return self.settlement(&settled);
            }
            self.shared.settled.wait(&mut guard);
        }
    }

    /// Like `wait`, giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Settlement> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.state.lock();
        loop {
            if let Some(settled) = drained_of(&guard) {
                drop(guard);
                return Some(self.settlement(&settled));
            }
            if self.shared.settled.wait_until(&mut guard, deadline).timed_out() {
                let settled = drained_of(&guard)?;
                drop(guard);
                return Some(self.settlement(&settled));
            }
        }
    }

    pub fn is_settled(&self) -> bool {
        settled_of(&self.shared.state.lock()).is_some()
    }

    /// Cancel the underlying request. Settlement still comes from the
    /// transport's completion.
    pub fn abort(&self) {
        if let Some(signal) = self.shared.abort.lock().as_ref() {
            signal.abort();
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        self.shared.fields.lock().ready_state
    }

    pub fn status(&self) -> Option<u16> {
        self.shared.fields.lock().status
    }

    pub fn status_text(&self) -> String {
        self.shared.fields.lock().status_text.clone()
    }

    pub fn response_text(&self) -> Option<String> {
        self.shared.fields.lock().response_text.clone()
    }

    pub fn response_json(&self) -> Option<Value> {
        self.shared.fields.lock().response_json.clone()
    }

    pub fn response_xml(&self) -> Option<Value> {
        self.shared.fields.lock().response_xml.clone()
    }

    pub fn native_response(&self) -> Option<NativeResponse> {
        self.shared.fields.lock().native_response.clone()
    }

    pub fn transport_error(&self) -> Option<TransportError> {
        self.shared.fields.lock().transport_error.clone()
    }

    /// Snapshot of all response fields.
    pub fn fields(&self) -> XhrFields {
        self.shared.fields.lock().clone()
    }

    /// Whether both values refer to the same underlying handle.
    pub fn ptr_eq(&self, other: &RequestHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn subscribe(&self, subscriber: Subscriber) {
        let mut guard = self.shared.state.lock();
        let settled = match &mut *guard {
            State::Pending(subscribers) => {
                subscribers.push(subscriber);
                return;
            }
            State::Settled { settled, .. } => Arc::clone(settled),
        };
        drop(guard);
        self.run(subscriber, &settled);
    }

    fn settle(&self, context: CallbackContext, outcome: Outcome) -> bool {
        let settled = Arc::new(Settled { context, outcome });
        let mut guard = self.shared.state.lock();
        let subscribers = match &mut *guard {
            State::Settled { .. } => return false,
            State::Pending(subscribers) => std::mem::take(subscribers),
        };
        *guard = State::Settled {
            settled: Arc::clone(&settled),
            drained: false,
        };
        drop(guard);

        // Waiters are released even if a subscriber panics.
        let _drain = Drain {
            shared: &self.shared,
        };
        for subscriber in subscribers {
            self.run(subscriber, &settled);
        }
        true
    }

    fn run(&self, subscriber: Subscriber, settled: &Settled) {
        let context = &settled.context;
        match (subscriber, &settled.outcome) {
            (Subscriber::Done(f), Outcome::Resolved(body)) => {
                f(context, &self.resolution(body));
            }
            (Subscriber::Fail(f), Outcome::Rejected(error)) => {
                f(context, &self.rejection(error));
            }
            (Subscriber::Always(f), _) => f(context, &self.settlement(settled)),
            _ => {}
        }
    }

    fn settlement(&self, settled: &Settled) -> Settlement {
        match &settled.outcome {
            Outcome::Resolved(body) => Settlement::Resolved(self.resolution(body)),
            Outcome::Rejected(error) => Settlement::Rejected(self.rejection(error)),
        }
    }

    fn resolution(&self, body: &Value) -> Resolution {
        Resolution {
            body: body.clone(),
            text_status: TextStatus::Success,
            handle: self.clone(),
        }
    }

    fn rejection(&self, error: &Option<TransportError>) -> Rejection {
        Rejection {
            handle: self.clone(),
            text_status: TextStatus::Error,
            error: error.clone(),
        }
    }
}

/// Marks the settlement drained and wakes waiters when dropped.
struct Drain<'a> {
    shared: &'a Shared,
}

impl Drop for Drain<'_> {
    fn drop(&mut self) {
        let mut guard = self.shared.state.lock();
        if let State::Settled { drained, .. } = &mut *guard {
            *drained = true;
        }
        self.shared.settled.notify_all();
    }
}

fn settled_of(state: &State) -> Option<Arc<Settled>> {
    match state {
        State::Settled { settled, .. } => Some(Arc::clone(settled)),
        State::Pending(_) => None,
    }
}

fn drained_of(state: &State) -> Option<Arc<Settled>> {
    match state {
        State::Settled { settled, drained: true } => Some(Arc::clone(settled)),
        _ => None,
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.shared.fields.lock();
        f.debug_struct("RequestHandle")
            .field("ready_state", &fields.ready_state)
            .field("status", &fields.status)
            .field("status_text", &fields.status_text)
            .finish_non_exhaustive()
    }
}

/// The resolving side of a `RequestHandle`.
#[derive(Debug, Clone)]
pub struct Deferred {
    handle: RequestHandle,
}

impl Default for Deferred {
    fn default() -> Self {
        Self::new()
    }
}

impl Deferred {
    pub fn new() -> Self {
        Self {
            handle: RequestHandle::new(),
        }
    }

    /// The promise view handed to callers.
    pub fn promise(&self) -> RequestHandle {
        self.handle.clone()
    }

    /// Bind the handle's `abort()` to `signal`.
    pub fn set_abort(&self, signal: AbortSignal) {
        *self.handle.shared.abort.lock() = Some(signal);
    }

    /// Mutate the handle's response fields.
    pub fn update_response<F>(&self, f: F)
    where
        F: FnOnce(&mut XhrFields),
    {
        f(&mut self.handle.shared.fields.lock());
    }

    /// Resolve with `body`. Returns `false` if already settled.
    pub fn resolve_with(&self, context: CallbackContext, body: Value) -> bool {
        self.handle.settle(context, Outcome::Resolved(body))
    }

    /// Reject with an optional transport error. Returns `false` if already
    /// settled.
    pub fn reject_with(&self, context: CallbackContext, error: Option<TransportError>) -> bool {
        self.handle.settle(context, Outcome::Rejected(error))
    }
}
