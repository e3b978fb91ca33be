//! Check URL building, request building and completion handling against the
//! JSON test vectors stored in `test-vectors/`.
//!
//! Requests are captured by a recording transport instead of going over the
//! network, and completions are fed back synchronously from the vector.

use std::sync::{Arc, Mutex};

use requ_core::{
    dispatch, query, Adapter, AdapterConfig, Completion, Environment, HttpMethod, NativeRequest,
    NativeResponse, RequestOptions, Transport,
};
use serde_json::{Map, Value};

/// Records every request and optionally completes it with a fixed response.
#[derive(Default)]
struct RecordingTransport {
    requests: Mutex<Vec<NativeRequest>>,
    reply: Option<NativeResponse>,
}

impl Transport for RecordingTransport {
    fn end(&self, request: NativeRequest, completion: Completion) {
        self.requests.lock().unwrap().push(request);
        if let Some(response) = &self.reply {
            completion.succeed(response.clone());
        }
    }
}

fn config(transport: &Arc<RecordingTransport>) -> Arc<AdapterConfig> {
    AdapterConfig::builder(Arc::clone(transport))
        .environment(Environment::Server)
        .build()
}

fn load(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

fn object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn options(case: &Value) -> RequestOptions {
    RequestOptions::from_json(case["options"].clone()).unwrap()
}

// ---------------------------------------------------------------------------
// extend_url
// ---------------------------------------------------------------------------

#[test]
fn extend_url_vectors() {
    for case in load(include_str!("../../test-vectors/extend_url.json")) {
        let name = case["name"].as_str().unwrap();
        let url = case["url"].as_str().unwrap();
        let actual = query::extend_url(url, &object(&case["data"]));
        assert_eq!(actual, case["expected"].as_str().unwrap(), "{name}");
    }
}

// ---------------------------------------------------------------------------
// dispatch
// ---------------------------------------------------------------------------

#[test]
fn dispatch_vectors() {
    for case in load(include_str!("../../test-vectors/dispatch.json")) {
        let name = case["name"].as_str().unwrap();
        let expected = &case["expected"];

        let transport = Arc::new(RecordingTransport::default());
        let adapter = Adapter::new(config(&transport));
        adapter.dispatch(options(&case)).unwrap().unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1, "{name}: one request");
        let request = &requests[0];

        let method: HttpMethod = expected["method"].as_str().unwrap().parse().unwrap();
        assert_eq!(request.method(), method, "{name}: method");
        assert_eq!(request.url(), expected["url"].as_str().unwrap(), "{name}: url");
        assert_eq!(request.full_url(), expected["full_url"].as_str().unwrap(), "{name}: full url");
        assert_eq!(
            adapter.full_url().as_deref(),
            expected["full_url"].as_str(),
            "{name}: adapter full url"
        );
        assert_eq!(
            adapter.settings().map(|s| s.url.clone()).as_deref(),
            expected["settings_url"].as_str(),
            "{name}: settings url"
        );
        assert_eq!(
            Value::Object(request.query_params().clone()),
            expected["query"],
            "{name}: query"
        );
        assert_eq!(
            request.body().cloned().map(Value::Object).unwrap_or(Value::Null),
            expected["body"],
            "{name}: body"
        );

        let expected_headers: Vec<(String, String)> =
            serde_json::from_value(expected["headers"].clone()).unwrap();
        assert_eq!(request.headers(), expected_headers.as_slice(), "{name}: headers");
    }
}

#[test]
fn contract_vectors() {
    for case in load(include_str!("../../test-vectors/contract.json")) {
        let name = case["name"].as_str().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let adapter = Adapter::new(config(&transport));

        let err = adapter.dispatch(options(&case)).unwrap_err();
        assert_eq!(err.to_string(), case["error"].as_str().unwrap(), "{name}");
        assert!(transport.requests.lock().unwrap().is_empty(), "{name}: nothing sent");
        assert!(!adapter.is_in_flight(), "{name}: adapter released");
    }
}

// ---------------------------------------------------------------------------
// completion
// ---------------------------------------------------------------------------

#[test]
fn completion_vectors() {
    for case in load(include_str!("../../test-vectors/completion.json")) {
        let name = case["name"].as_str().unwrap();
        let response = &case["response"];
        let expected = &case["expected"];

        let status = response["status"].as_u64().unwrap() as u16;
        let headers = match response["content_type"].as_str().unwrap() {
            "" => Vec::new(),
            content_type => vec![("Content-Type".to_string(), content_type.to_string())],
        };
        let reply = NativeResponse::plain(
            status,
            headers,
            response["text"].as_str().unwrap(),
            response["body"].clone(),
        );
        let transport = Arc::new(RecordingTransport {
            reply: Some(reply),
            ..RecordingTransport::default()
        });

        let options = RequestOptions::new("my/url").method("get").data_type("json");
        let handle = dispatch(&config(&transport), options).unwrap().unwrap();
        assert!(handle.is_settled(), "{name}: settled synchronously");

        let settlement = handle.wait();
        let outcome = if settlement.is_resolved() { "resolved" } else { "rejected" };
        assert_eq!(outcome, expected["outcome"].as_str().unwrap(), "{name}: outcome");
        if let Some(rejection) = settlement.rejection() {
            assert!(rejection.error.is_none(), "{name}: no transport error");
        }
        if let Some(resolution) = settlement.resolution() {
            assert_eq!(resolution.body, response["body"], "{name}: body");
        }

        assert_eq!(handle.status(), Some(status), "{name}: status");
        assert_eq!(handle.status_text(), expected["status_text"].as_str().unwrap(), "{name}: status text");
        assert_eq!(
            handle.response_text().as_deref(),
            response["text"].as_str(),
            "{name}: response text"
        );
        assert_eq!(
            handle.response_json().unwrap_or(Value::Null),
            expected["response_json"],
            "{name}: response json"
        );
        assert_eq!(
            handle.response_xml().unwrap_or(Value::Null),
            expected["response_xml"],
            "{name}: response xml"
        );
    }
}

#[test]
fn shared_recorder_sees_every_dispatch() {
    let transport = Arc::new(RecordingTransport::default());
    let config = config(&transport);
    let seen = Arc::new(Mutex::new(0));
    for case in load(include_str!("../../test-vectors/dispatch.json")) {
        let counter = Arc::clone(&seen);
        let opts = options(&case).always(move |_, _| *counter.lock().unwrap() += 1);
        dispatch(&config, opts).unwrap().unwrap();
    }
    // Nothing completes without a reply.
    assert_eq!(*seen.lock().unwrap(), 0);
    assert_eq!(transport.requests.lock().unwrap().len(), 7);
}
