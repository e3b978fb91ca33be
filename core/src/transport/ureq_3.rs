use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use ureq::typestate::WithBody;
use ureq::{Agent, Body, RequestBuilder};

use super::{Completion, Transport};
use crate::error::TransportError;
use crate::http::{HttpMethod, NativeRequest, NativeResponse, TransportEvent};

/// Blocking `ureq` agent driven from a background thread per request.
///
/// Status codes are returned as data rather than errors so the adapter can
/// classify them itself.
#[derive(Clone)]
pub struct UreqTransport {
    agent: Agent,
    timeout: Option<Duration>,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        Self {
            agent: build_agent(None),
            timeout: None,
        }
    }

    /// Fail requests that take longer than `timeout` end to end.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            agent: build_agent(Some(timeout)),
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Transport for UreqTransport {
    fn end(&self, request: NativeRequest, completion: Completion) {
        let agent = self.agent.clone();
        // Held here as well so a failed spawn can still complete.
        let slot = Arc::new(Mutex::new(Some(completion)));
        let worker_slot = Arc::clone(&slot);

        let spawned = thread::Builder::new()
            .name("requ-transport".to_string())
            .spawn(move || {
                let (error, response) = execute(&agent, &request);
                if let Some(completion) = worker_slot.lock().take() {
                    completion.complete(error, response);
                }
            });

        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to spawn transport thread");
            if let Some(completion) = slot.lock().take() {
                completion.fail(TransportError::Io(e.to_string()));
            }
        }
    }
}

fn build_agent(timeout: Option<Duration>) -> Agent {
    Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(timeout)
        .build()
        .new_agent()
}

fn execute(agent: &Agent, request: &NativeRequest) -> (Option<TransportError>, Option<NativeResponse>) {
    if request.is_aborted() {
        request.emit(&TransportEvent::Abort);
        return (Some(TransportError::Aborted), None);
    }

    let body = match request.encoded_body() {
        Ok(body) => body,
        Err(e) => return (Some(e), None),
    };
    let url = request.full_url();

    tracing::debug!(method = %request.method(), url = %url, "sending request");
    request.emit(&TransportEvent::Request);

    let mut response = match call(agent, request, &url, body.as_deref()) {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "transport error");
            return (Some(TransportError::Io(e.to_string())), None);
        }
    };

    let status = response.status().as_u16();
    request.emit(&TransportEvent::Response { status });

    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    let text = match response.body_mut().read_to_string() {
        Ok(text) => text,
        Err(e) => return (Some(TransportError::Io(e.to_string())), None),
    };

    if request.is_aborted() {
        request.emit(&TransportEvent::Abort);
        return (Some(TransportError::Aborted), None);
    }

    let content_type = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .map(|(_, value)| value.clone())
        .unwrap_or_default();
    let (body, error) = parse_body(&content_type, &text);

    (error, Some(NativeResponse::plain(status, headers, &text, body)))
}

fn call(
    agent: &Agent,
    request: &NativeRequest,
    url: &str,
    body: Option<&str>,
) -> Result<ureq::http::Response<Body>, ureq::Error> {
    match request.method() {
        HttpMethod::Get => with_headers(agent.get(url), request).call(),
        HttpMethod::Head => with_headers(agent.head(url), request).call(),
        HttpMethod::Delete => with_headers(agent.delete(url), request).call(),
        HttpMethod::Post => send(with_headers(agent.post(url), request), body),
        HttpMethod::Put => send(with_headers(agent.put(url), request), body),
        HttpMethod::Patch => send(with_headers(agent.patch(url), request), body),
    }
}

/// Copy request headers onto the builder. Framing headers are left to ureq.
fn with_headers<B>(mut builder: RequestBuilder<B>, request: &NativeRequest) -> RequestBuilder<B> {
    for (name, value) in request.headers() {
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send(
    builder: RequestBuilder<WithBody>,
    body: Option<&str>,
) -> Result<ureq::http::Response<Body>, ureq::Error> {
    match body {
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}

/// JSON bodies are parsed; any other non-empty body is surfaced as a string.
fn parse_body(content_type: &str, text: &str) -> (Value, Option<TransportError>) {
    if text.is_empty() {
        return (Value::Null, None);
    }
    if content_type.contains("json") {
        return match serde_json::from_str(text) {
            Ok(value) => (value, None),
            Err(e) => (Value::Null, Some(TransportError::Parse(e.to_string()))),
        };
    }
    (Value::String(text.to_string()), None)
}
