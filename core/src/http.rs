//! HTTP types shared between the adapter and its transports.
//!
//! # Design
//! `NativeRequest` is the request value a transport hands out for one method
//! and URL. The adapter mutates it through a small chainable surface (`send`,
//! `query`, `set`, `on`) and then passes it back to the transport together
//! with a `Completion`. All fields use owned types so the request can move to
//! whatever thread the transport runs on.
//!
//! `NativeResponse` is the tagged union of the two response shapes a
//! transport may deliver: a plain server-side response (status code, text,
//! headers) or an XHR-like object whose fields are already normalized.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ContractError, TransportError};
use crate::query;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
        }
    }

    /// Whether `data` travels as a request body (POST, PUT, PATCH) rather
    /// than as query parameters.
    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ContractError;

    /// Case-insensitive, so `"get"` and `"GET"` both parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [HttpMethod; 6] = [
            HttpMethod::Get,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Delete,
            HttpMethod::Patch,
            HttpMethod::Head,
        ];
        ALL.into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ContractError::UnsupportedMethod(s.to_string()))
    }
}

/// Expected response type; selects the `Accepts` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Html,
    Xml,
    Text,
    Json,
}

impl DataType {
    /// MIME type sent in the `Accepts` header.
    pub fn accepts(&self) -> &'static str {
        match self {
            DataType::Html => "text/html",
            DataType::Xml => "text/xml",
            DataType::Text => "text/plain",
            DataType::Json => "application/json",
        }
    }
}

impl FromStr for DataType {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(DataType::Html),
            "xml" => Ok(DataType::Xml),
            "text" => Ok(DataType::Text),
            "json" => Ok(DataType::Json),
            other => Err(ContractError::UnsupportedDataType(other.to_string())),
        }
    }
}

/// Shared cancellation flag between a native request and the handle that
/// exposes `abort()`.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle events a transport emits on a native request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The request is about to go out on the wire.
    Request,
    /// Response headers arrived; the body may still be downloading.
    Response { status: u16 },
    /// The request was cancelled through its abort signal.
    Abort,
    /// Any transport-specific event.
    Other(String),
}

impl TransportEvent {
    /// Name listeners subscribe under.
    pub fn name(&self) -> &str {
        match self {
            TransportEvent::Request => "request",
            TransportEvent::Response { .. } => "response",
            TransportEvent::Abort => "abort",
            TransportEvent::Other(name) => name,
        }
    }
}

/// Handler attached to a native request with `NativeRequest::on`.
pub type EventHandler = Arc<dyn Fn(&TransportEvent) + Send + Sync>;

/// The request object a transport produces for one method and URL.
#[derive(Clone)]
pub struct NativeRequest {
    method: HttpMethod,
    url: String,
    query: Map<String, Value>,
    body: Option<Map<String, Value>>,
    headers: Vec<(String, String)>,
    listeners: Vec<(String, EventHandler)>,
    abort: AbortSignal,
}

impl NativeRequest {
    pub fn new(method: HttpMethod, url: &str) -> Self {
        Self {
            method,
            url: url.to_string(),
            query: Map::new(),
            body: None,
            headers: Vec::new(),
            listeners: Vec::new(),
            abort: AbortSignal::new(),
        }
    }

    /// Attach a body. Repeated calls merge object keys.
    pub fn send(&mut self, data: &Map<String, Value>) -> &mut Self {
        let body = self.body.get_or_insert_with(Map::new);
        body.extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Attach query parameters. Repeated calls merge keys.
    pub fn query(&mut self, data: &Map<String, Value>) -> &mut Self {
        self.query
            .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set a header, replacing any existing value with the same name
    /// (compared case-insensitively).
    pub fn set(&mut self, name: &str, value: &str) -> &mut Self {
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => {
                entry.0 = name.to_string();
                entry.1 = value.to_string();
            }
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        self
    }

    /// Subscribe `handler` to events named `event`.
    pub fn on<F>(&mut self, event: &str, handler: F) -> &mut Self
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.listeners.push((event.to_string(), Arc::new(handler)));
        self
    }

    /// Invoke every handler subscribed to `event.name()`.
    pub fn emit(&self, event: &TransportEvent) {
        for (name, handler) in &self.listeners {
            if name == event.name() {
                handler(event);
            }
        }
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// The URL the request was built for, without attached query parameters.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The URL with attached query parameters merged into its query string.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            self.url.clone()
        } else {
            query::extend_url(&self.url, &self.query)
        }
    }

    pub fn query_params(&self) -> &Map<String, Value> {
        &self.query
    }

    pub fn body(&self) -> Option<&Map<String, Value>> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Names of the events that have at least one subscriber.
    pub fn event_names(&self) -> Vec<&str> {
        self.listeners.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Serialize the body according to the `Content-Type` header: form
    /// encoding for `application/x-www-form-urlencoded`, JSON otherwise.
    pub fn encoded_body(&self) -> Result<Option<String>, TransportError> {
        let Some(body) = &self.body else {
            return Ok(None);
        };
        let content_type = self.header("content-type").unwrap_or("");
        if content_type.contains("application/x-www-form-urlencoded") {
            return Ok(Some(query::stringify(body)));
        }
        serde_json::to_string(body)
            .map(Some)
            .map_err(|e| TransportError::Encode(e.to_string()))
    }
}

impl fmt::Debug for NativeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("headers", &self.headers)
            .field("events", &self.event_names())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

/// A response as delivered by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeResponse {
    /// Parsed body. `Value::Null` when the transport produced none.
    pub body: Value,
    pub shape: ResponseShape,
}

/// The two response shapes a transport may deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseShape {
    Plain(PlainResponse),
    Xhr(XhrResponse),
}

/// Server-side response: raw status, text and headers.
#[derive(Debug, Clone, PartialEq)]
pub struct PlainResponse {
    pub status_code: u16,
    pub text: String,
    pub headers: Vec<(String, String)>,
}

impl PlainResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Browser XHR-like response with fields that are copied over verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XhrResponse {
    pub status: u16,
    pub status_text: String,
    pub response_text: Option<String>,
    pub response_json: Option<Value>,
    pub response_xml: Option<Value>,
}

impl NativeResponse {
    pub fn plain(status_code: u16, headers: Vec<(String, String)>, text: &str, body: Value) -> Self {
        Self {
            body,
            shape: ResponseShape::Plain(PlainResponse {
                status_code,
                text: text.to_string(),
                headers,
            }),
        }
    }

    pub fn xhr(body: Value, xhr: XhrResponse) -> Self {
        Self {
            body,
            shape: ResponseShape::Xhr(xhr),
        }
    }

    pub fn status(&self) -> u16 {
        match &self.shape {
            ResponseShape::Plain(res) => res.status_code,
            ResponseShape::Xhr(xhr) => xhr.status,
        }
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
