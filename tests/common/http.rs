//! One-call HTTP driver for the integration suites: pushes a request through
//! the router with `oneshot` and hands back status, headers, and decoded JSON.

use axum::body::{to_bytes, Body};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::util::ServiceExt;

pub async fn send(
    app: &Router,
    method: Method,
    path: &str,
    body: Option<Value>,
    headers: &[(&str, String)],
) -> (StatusCode, HeaderMap, Value) {
    let payload = body.as_ref().map(|b| b.to_string());

    let mut builder = Request::builder().method(method).uri(path);
    if payload.is_some() {
        builder = builder.header("content-type", "application/json");
    }
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    let request = builder
        .body(payload.map(Body::from).unwrap_or_else(Body::empty))
        .expect("build request");

    let response = app.clone().oneshot(request).await.expect("route request");
    let status = response.status();
    let response_headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("drain body");

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("decode json body")
    };
    (status, response_headers, json)
}

/// Success envelope check; hands back the `data` field for further asserts.
pub fn assert_ok(status: StatusCode, body: &Value) -> Value {
    assert!(status.is_success(), "expected 2xx, got {status}: {body}");
    assert_eq!(body["success"], true);
    body["data"].clone()
}

pub fn assert_error(status: StatusCode, body: &Value, expected: StatusCode, code: &str) {
    assert_eq!(status, expected, "unexpected status: {body}");
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], code);
    assert!(body.get("message").is_some());
}
