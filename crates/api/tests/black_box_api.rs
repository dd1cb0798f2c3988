use std::sync::Arc;
use std::time::Duration;

use estore_infra::SubscriptionOptions;
use estore_server::app::{AppServices, build_app};
use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory backend, ephemeral port.
        let services = Arc::new(AppServices::in_memory(SubscriptionOptions {
            poll_interval: Duration::from_millis(10),
            ..SubscriptionOptions::default()
        }));
        let app = build_app(services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read_stream(client: &reqwest::Client, srv: &TestServer, path: &str) -> Vec<serde_json::Value> {
    let res = client.get(srv.url(path)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn duplicate_version_conflicts_and_keeps_the_first_event() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/S1/Order.Created"))
        .header("X-ES-Version", "1")
        .json(&json!({"qty": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.text().await.unwrap().contains("Order.Created"));

    let res = client
        .post(srv.url("/S1/Order.Cancelled"))
        .header("X-ES-Version", "1")
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "conflict");
    assert!(!err["message"].as_str().unwrap().is_empty());

    let events = read_stream(&client, &srv, "/stream/S1").await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event["name"], "Order.Created");
    assert_eq!(event["body"], json!({"qty": 2}));
    assert_eq!(event["version"], 1);
    for field in ["id", "seq", "stream", "created", "version", "name", "body", "headers"] {
        assert!(event.get(field).is_some(), "missing field {field}");
    }
}

#[tokio::test]
async fn prefixed_headers_are_stored_on_the_event() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/S2/Order.Created"))
        .header("X-ES-Version", "3")
        .header("X-ES-Correlation-Id", "req-42")
        .header("X-Other", "ignored")
        .form(&[("sku", "A-1"), ("qty", "5")])
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let events = read_stream(&client, &srv, "/stream/S2").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["version"], 3);
    assert_eq!(events[0]["headers"], json!({"Version": "3", "Correlation-Id": "req-42"}));
    assert_eq!(events[0]["body"], json!({"sku": "A-1", "qty": "5"}));
}

#[tokio::test]
async fn snapshot_query_compacts_the_stream() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for version in 1..=5 {
        let name = if version == 3 { "Order.Snapshot" } else { "Order.Changed" };
        let res = client
            .post(srv.url(&format!("/S3/{name}")))
            .header("X-ES-Version", version.to_string())
            .json(&json!({"n": version}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let full = read_stream(&client, &srv, "/stream/S3").await;
    assert_eq!(full.len(), 5);

    let compacted = read_stream(&client, &srv, "/stream/S3?snapshot=true").await;
    let versions: Vec<i64> = compacted.iter().map(|e| e["version"].as_i64().unwrap()).collect();
    assert_eq!(versions, vec![3, 4, 5]);
}

#[tokio::test]
async fn unknown_stream_reads_as_empty_array() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    assert!(read_stream(&client, &srv, "/stream/nobody").await.is_empty());
}

#[tokio::test]
async fn non_integer_version_is_rejected() {
    let srv = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .post(srv.url("/S4/Order.Created"))
        .header("X-ES-Version", "first")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
