use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use dns_reconciler::{
    domain_filter::{DomainFilter, Visibility, Zone},
    plan::Changes,
    provider::{InMemoryProvider, Provider, ProviderError},
    webhook::{self, WEBHOOK_CONTENT_TYPE},
    Endpoint,
};

fn app() -> Router {
    let provider = InMemoryProvider::new(&[Zone::new("z1", "example.com", Visibility::Public)])
        .with_domain_filter(DomainFilter::new(["example.com"]));
    webhook::router(Arc::new(provider))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Option<String>, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, content_type, json)
}

#[tokio::test]
async fn negotiation_returns_domain_filter() {
    let app = app();
    let (status, content_type, body) = send(&app, "GET", "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(WEBHOOK_CONTENT_TYPE));
    assert_eq!(body, json!({"include": ["example.com"], "exclude": []}));
}

#[tokio::test]
async fn healthz_is_ok() {
    let (status, _, body) = send(&app(), "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn applied_changes_show_up_in_records() {
    let app = app();
    let changes = json!({
        "create": [
            {"dnsName": "www.example.com", "recordType": "A", "targets": ["1.2.3.4"], "recordTTL": 60},
            {"dnsName": "api.example.com", "recordType": "CNAME", "targets": ["lb.example.net"]}
        ]
    });
    let (status, _, _) = send(&app, "POST", "/records", Some(changes)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let update = json!({
        "updateOld": [{"dnsName": "www.example.com", "recordType": "A", "targets": ["1.2.3.4"], "recordTTL": 60}],
        "updateNew": [{"dnsName": "www.example.com", "recordType": "A", "targets": ["5.6.7.8"], "recordTTL": 60}],
        "delete": [{"dnsName": "api.example.com", "recordType": "CNAME", "targets": ["lb.example.net"]}]
    });
    let (status, _, _) = send(&app, "POST", "/records", Some(update)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, content_type, body) = send(&app, "GET", "/records", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(WEBHOOK_CONTENT_TYPE));
    let records: Vec<Endpoint> = serde_json::from_value(body).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].dns_name, "www.example.com");
    assert_eq!(records[0].targets, vec!["5.6.7.8"]);
}

#[tokio::test]
async fn unpaired_updates_are_a_bad_request() {
    let body = json!({
        "updateOld": [{"dnsName": "www.example.com", "recordType": "A", "targets": ["1.2.3.4"]}]
    });
    let (status, _, body) = send(&app(), "POST", "/records", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("updateOld"));
}

#[tokio::test]
async fn rejected_changes_are_a_server_error() {
    let body = json!({
        "delete": [{"dnsName": "missing.example.com", "recordType": "A", "targets": ["1.2.3.4"]}]
    });
    let (status, _, _) = send(&app(), "POST", "/records", Some(body)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

struct Throttled;

#[async_trait]
impl Provider for Throttled {
    async fn records(&self) -> Result<Vec<Endpoint>, ProviderError> {
        Err(ProviderError::soft("429 Too Many Requests"))
    }

    async fn apply_changes(&self, _: &Changes) -> Result<(), ProviderError> {
        Err(ProviderError::soft("429 Too Many Requests"))
    }
}

#[tokio::test]
async fn soft_failures_are_service_unavailable() {
    let app = webhook::router(Arc::new(Throttled));

    let (status, _, _) = send(&app, "GET", "/records", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _, _) = send(&app, "POST", "/records", Some(json!({}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn adjust_drops_invalid_endpoints() {
    let body = json!([
        {"dnsName": "ok.example.com", "recordType": "A", "targets": ["1.2.3.4"]},
        {"dnsName": "bad.example.com", "recordType": "A", "targets": ["not-an-ip"]},
        {"dnsName": "two.example.com", "recordType": "CNAME", "targets": ["a.example.net", "b.example.net"]}
    ]);
    let (status, content_type, body) = send(&app(), "POST", "/adjustendpoints", Some(body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some(WEBHOOK_CONTENT_TYPE));
    let kept: Vec<Endpoint> = serde_json::from_value(body).unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].dns_name, "ok.example.com");
}
