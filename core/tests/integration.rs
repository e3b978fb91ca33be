//! End-to-end requests through `UreqTransport` against the live echo server.
//!
//! # Design
//! Starts the mock server on a random port in a background runtime, then
//! dispatches jQuery-style options over real HTTP and checks what the server
//! received alongside how the handle settled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use requ_core::{
    dispatch, Adapter, AdapterConfig, Environment, HttpMethod, ReadyState, RequestOptions, Settlement,
    TransportError, UreqTransport,
};
use serde_json::{json, Value};

const WAIT: Duration = Duration::from_secs(10);

fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn server_config() -> Arc<AdapterConfig> {
    AdapterConfig::builder(UreqTransport::new())
        .environment(Environment::Server)
        .build()
}

fn settle(options: RequestOptions) -> Settlement {
    dispatch(&server_config(), options)
        .unwrap()
        .unwrap()
        .wait_timeout(WAIT)
        .expect("request did not settle")
}

#[test]
fn get_sends_data_as_query() {
    let base = start_server();
    let options = RequestOptions::new(&format!("{base}/echo?keep=1"))
        .method("get")
        .data_type("json")
        .data(json!({"foo": "bar", "list": [1, 2]}));

    let settlement = settle(options);
    let resolution = settlement.resolution().expect("resolved");
    let body = &resolution.body;
    assert_eq!(body["method"], "GET");
    assert_eq!(
        body["query"],
        json!([["keep", "1"], ["foo", "bar"], ["list[0]", "1"], ["list[1]", "2"]])
    );
    assert_eq!(body["headers"]["accepts"], "application/json");
    assert!(body["body"].is_null());

    let handle = &resolution.handle;
    assert_eq!(handle.ready_state(), ReadyState::Done);
    assert_eq!(handle.status(), Some(200));
    assert_eq!(handle.status_text(), "OK");
    assert_eq!(handle.response_json().as_ref(), Some(body));
}

#[test]
fn post_sends_json_body() {
    let base = start_server();
    let adapter = Adapter::new(server_config());
    let options = RequestOptions::new(&format!("{base}/echo"))
        .method("POST")
        .data_type("json")
        .content_type("application/json")
        .header("X-Trace", "abc")
        .data(json!({"bar": 1, "nested": {"ok": true}}));

    let handle = adapter.dispatch(options).unwrap().unwrap();
    let settlement = handle.wait_timeout(WAIT).expect("request did not settle");
    let body = &settlement.resolution().expect("resolved").body;

    assert_eq!(body["method"], "POST");
    assert_eq!(body["body"], json!({"bar": 1, "nested": {"ok": true}}));
    assert_eq!(body["headers"]["x-trace"], "abc");
    assert_eq!(body["headers"]["content-type"], "application/json");
    assert_eq!(adapter.method(), Some(HttpMethod::Post));
    assert_eq!(adapter.full_url(), Some(format!("{base}/echo")));
    assert!(!adapter.is_in_flight());
}

#[test]
fn form_encoded_put() {
    let base = start_server();
    let options = RequestOptions::new(&format!("{base}/echo"))
        .method("put")
        .data_type("text")
        .content_type("application/x-www-form-urlencoded")
        .data(json!({"a": "x y", "b": 2}));

    let settlement = settle(options);
    // The body is parsed by response content type, not by dataType.
    let echoed = &settlement.resolution().expect("resolved").body;
    assert_eq!(echoed["method"], "PUT");
    assert_eq!(echoed["body"], "a=x%20y&b=2");
    assert_eq!(echoed["headers"]["accepts"], "text/plain");
}

#[test]
fn delete_without_body() {
    let base = start_server();
    let options = RequestOptions::new(&format!("{base}/echo"))
        .method("delete")
        .data_type("json");

    let settlement = settle(options);
    let body = &settlement.resolution().expect("resolved").body;
    assert_eq!(body["method"], "DELETE");
    assert!(body["body"].is_null());
}

#[test]
fn server_error_rejects_with_status() {
    let base = start_server();
    let calls = Arc::new(Mutex::new(Vec::new()));
    let (on_error, on_complete) = (Arc::clone(&calls), Arc::clone(&calls));
    let options = RequestOptions::new(&format!("{base}/status/500"))
        .method("get")
        .data_type("json")
        .error(move |_, rejection| {
            assert!(rejection.error.is_none());
            on_error.lock().unwrap().push("error");
        })
        .complete(move |_, _| on_complete.lock().unwrap().push("complete"));

    let settlement = settle(options);
    let rejection = settlement.rejection().expect("rejected");
    assert_eq!(rejection.text_status.as_str(), "error");
    assert!(rejection.error.is_none());
    assert_eq!(rejection.handle.status(), Some(500));
    assert_eq!(rejection.handle.status_text(), "Internal Server Error");
    assert_eq!(rejection.handle.response_json(), Some(json!({"status": 500})));
    assert_eq!(*calls.lock().unwrap(), vec!["error", "complete"]);
}

#[test]
fn no_content_resolves() {
    let base = start_server();
    let settlement = settle(
        RequestOptions::new(&format!("{base}/status/204"))
            .method("get")
            .data_type("json"),
    );
    let handle = settlement.handle();
    assert!(settlement.is_resolved());
    assert_eq!(handle.status(), Some(204));
    assert_eq!(handle.status_text(), "No Content");
    assert_eq!(settlement.resolution().map(|r| r.body.clone()), Some(Value::Null));
}

#[test]
fn xml_body_fills_response_xml() {
    let base = start_server();
    let settlement = settle(
        RequestOptions::new(&format!("{base}/xml"))
            .method("get")
            .data_type("xml"),
    );
    let resolution = settlement.resolution().expect("resolved");
    assert_eq!(resolution.body, json!(mock_server::XML_BODY));
    assert_eq!(resolution.handle.response_xml(), Some(json!(mock_server::XML_BODY)));
    assert_eq!(resolution.handle.response_json(), None);
    assert_eq!(resolution.handle.response_text().as_deref(), Some(mock_server::XML_BODY));
}

#[test]
fn connection_refused_rejects_with_transport_error() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let settlement = settle(
        RequestOptions::new(&format!("http://{addr}/echo"))
            .method("get")
            .data_type("json"),
    );
    let rejection = settlement.rejection().expect("rejected");
    assert!(matches!(rejection.error, Some(TransportError::Io(_))));
    assert_eq!(rejection.handle.status(), None);
    assert!(rejection.handle.native_response().is_none());
    assert_eq!(rejection.handle.ready_state(), ReadyState::Done);
}

#[test]
fn transport_timeout_rejects() {
    let base = start_server();
    let config = AdapterConfig::builder(UreqTransport::with_timeout(Duration::from_millis(100)))
        .environment(Environment::Server)
        .build();
    let handle = dispatch(
        &config,
        RequestOptions::new(&format!("{base}/delay/2000"))
            .method("get")
            .data_type("json"),
    )
    .unwrap()
    .unwrap();

    let settlement = handle.wait_timeout(WAIT).expect("request did not settle");
    assert!(matches!(
        settlement.rejection().and_then(|r| r.error.clone()),
        Some(TransportError::Io(_))
    ));
}

#[test]
fn listeners_observe_request_and_response() {
    let base = start_server();
    let events = Arc::new(Mutex::new(Vec::new()));
    let (sent, received) = (Arc::clone(&events), Arc::clone(&events));
    let config = AdapterConfig::builder(UreqTransport::new())
        .environment(Environment::Server)
        .on_request_sent(move |adapter, event| {
            sent.lock()
                .unwrap()
                .push(format!("{}:{}", event.name(), adapter.full_url().unwrap_or_default()));
        })
        .on_response(move |_, event| {
            received.lock().unwrap().push(format!("{event:?}"));
        })
        .build();

    let handle = dispatch(
        &config,
        RequestOptions::new(&format!("{base}/echo"))
            .data_type("json")
            .data(json!({"q": "1"})),
    )
    .unwrap()
    .unwrap();
    assert!(handle.wait_timeout(WAIT).expect("settled").is_resolved());

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            format!("request:{base}/echo?q=1"),
            "Response { status: 200 }".to_string(),
        ]
    );
}

#[test]
fn adapter_is_reusable_after_completion() {
    let base = start_server();
    let adapter = Adapter::new(server_config());
    let url = format!("{base}/echo");

    for expected in 1..=2 {
        let handle = adapter
            .dispatch(RequestOptions::new(&url).method("get").data_type("json"))
            .unwrap()
            .expect("adapter idle");
        let settlement = handle.wait_timeout(WAIT).expect("settled");
        assert_eq!(settlement.resolution().expect("resolved").body["seq"], expected);
    }
}
