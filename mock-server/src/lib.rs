use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use url::form_urlencoded;

pub const XML_BODY: &str = "<note><to>requ</to><body>hello</body></note>";
pub const TEXT_BODY: &str = "plain text";

/// What `/echo` saw of a request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub seq: u64,
    pub method: String,
    pub query: Vec<(String, String)>,
    pub raw_query: Option<String>,
    pub headers: BTreeMap<String, String>,
    /// Parsed when the request declared a JSON body, the raw text otherwise.
    pub body: Value,
}

pub type Counter = Arc<AtomicU64>;

pub fn app() -> Router {
    let counter: Counter = Arc::new(AtomicU64::new(0));
    Router::new()
        .route("/echo", any(echo))
        .route("/status/{code}", any(status))
        .route("/delay/{ms}", get(delay))
        .route("/xml", get(xml))
        .route("/text", get(text))
        .with_state(counter)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        tracing::debug!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

async fn echo(
    State(counter): State<Counter>,
    method: Method,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: String,
) -> Json<Echo> {
    let seq = counter.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::debug!(seq, %method, query = ?raw_query, "echo");

    let query = raw_query.as_deref().map(query_pairs).unwrap_or_default();

    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    let is_json = headers
        .get("content-type")
        .is_some_and(|ct| ct.contains("json"));
    let body = if body.is_empty() {
        Value::Null
    } else if is_json {
        serde_json::from_str(&body).unwrap_or(Value::String(body))
    } else {
        Value::String(body)
    };

    Json(Echo {
        seq,
        method: method.to_string(),
        query,
        raw_query,
        headers,
        body,
    })
}

fn query_pairs(query: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}

async fn status(Path(code): Path<u16>) -> Result<impl IntoResponse, StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, Json(serde_json::json!({ "status": code }))))
}

async fn delay(Path(ms): Path<u64>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(serde_json::json!({ "delayed": ms }))
}

async fn xml() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], XML_BODY)
}

async fn text() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], TEXT_BODY)
}
