//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage backend wiring
//! - `routes/`: HTTP and WebSocket handlers
//! - `headers.rs` / `body.rs`: append request mapping
//! - `errors.rs`: store outcome → status code mapping

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

pub mod body;
pub mod errors;
pub mod headers;
pub mod routes;
pub mod services;

pub use services::{AppServices, build_services};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    routes::router().layer(ServiceBuilder::new().layer(Extension(services)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::{Request, StatusCode};
    use estore_core::{Event, NewEvent, StreamId};
    use estore_infra::event_store::{EventLog, InMemoryEventLog, ReadMode};
    use estore_infra::{StoreError, SubscriptionOptions};
    use tower::ServiceExt;

    fn app() -> Router {
        build_app(Arc::new(AppServices::in_memory(SubscriptionOptions::default())))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_backend() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["backend"], "memory");
    }

    #[tokio::test]
    async fn append_then_read_through_the_router() {
        let app = app();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/S1/Order.Created")
                    .header("X-ES-Version", "1")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"qty":2}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/stream/S1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let events = body_json(response).await;
        assert_eq!(events.as_array().unwrap().len(), 1);
        assert_eq!(events[0]["body"]["qty"], 2);
        assert_eq!(events[0]["headers"]["Version"], "1");
    }

    #[tokio::test]
    async fn append_without_version_is_a_bad_request() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/S1/Order.Created")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "validation_error");
    }

    #[tokio::test]
    async fn malformed_json_body_is_rejected() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/S1/Order.Created")
                    .header("X-ES-Version", "1")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_body");
    }

    #[tokio::test]
    async fn reserved_segments_do_not_accept_appends() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/stream/Order.Created")
                    .header("X-ES-Version", "1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn repeated_version_header_is_a_bad_request() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/S1/Order.Created")
                    .header("X-ES-Version", "1")
                    .header("X-ES-Version", "2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "validation_error");
    }

    /// In-memory log that counts how often a subscription could have started.
    #[derive(Default)]
    struct CountingLog {
        inner: InMemoryEventLog,
        heads: AtomicUsize,
        feeds: AtomicUsize,
    }

    #[axum::async_trait]
    impl EventLog for CountingLog {
        async fn append(&self, event: NewEvent) -> Result<Event, StoreError> {
            self.inner.append(event).await
        }

        async fn read_stream(&self, stream: &StreamId, mode: ReadMode) -> Result<Vec<Event>, StoreError> {
            self.inner.read_stream(stream, mode).await
        }

        async fn read_feed(&self, after_seq: i64, limit: usize) -> Result<Vec<Event>, StoreError> {
            self.feeds.fetch_add(1, Ordering::SeqCst);
            self.inner.read_feed(after_seq, limit).await
        }

        async fn head(&self) -> Result<i64, StoreError> {
            self.heads.fetch_add(1, Ordering::SeqCst);
            self.inner.head().await
        }
    }

    fn counting_app() -> (Router, Arc<CountingLog>) {
        let log = Arc::new(CountingLog::default());
        let services = AppServices::new(log.clone(), SubscriptionOptions::default(), "memory");
        (build_app(Arc::new(services)), log)
    }

    #[tokio::test]
    async fn non_numeric_start_offset_is_rejected() {
        let (app, log) = counting_app();
        let response = app
            .oneshot(Request::builder().uri("/ws/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(log.feeds.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn plain_get_on_ws_does_not_subscribe() {
        let (app, log) = counting_app();
        for uri in ["/ws", "/ws/0"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert!(response.status().is_client_error(), "{uri}: {}", response.status());
        }

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(log.heads.load(Ordering::SeqCst), 0);
        assert_eq!(log.feeds.load(Ordering::SeqCst), 0);
    }
}
