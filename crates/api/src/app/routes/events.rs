//! Append and one-shot read endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use estore_core::{NewEvent, StreamId};
use estore_infra::StoreError;

use crate::app::body::EventBody;
use crate::app::errors::store_error_to_response;
use crate::app::headers::{event_headers, event_version};
use crate::app::services::AppServices;

#[derive(Debug, Default, Deserialize)]
pub struct ReadParams {
    /// Start at the latest snapshot instead of the beginning of the stream.
    #[serde(default)]
    pub snapshot: bool,
}

/// POST /{stream}/{name}
///
/// Body is the event payload; `X-ES-*` headers become event headers and
/// `X-ES-Version` is the event version. Responds `200 OK` with a plain-text
/// confirmation, `409` on a version conflict, `503` if storage is down.
pub async fn append(
    Extension(services): Extension<Arc<AppServices>>,
    Path((stream, name)): Path<(String, String)>,
    headers: HeaderMap,
    EventBody(body): EventBody,
) -> Response {
    let event = match new_event(stream, name, &headers, body) {
        Ok(event) => event,
        Err(err) => return store_error_to_response(err),
    };

    match services.events.append(event).await {
        Ok(stored) => (
            StatusCode::OK,
            format!(
                "appended {} to {} at version {} (seq {})",
                stored.name, stored.stream, stored.version, stored.seq
            ),
        )
            .into_response(),
        Err(err) => store_error_to_response(err),
    }
}

fn new_event(
    stream: String,
    name: String,
    headers: &HeaderMap,
    body: serde_json::Value,
) -> Result<NewEvent, StoreError> {
    let stream = StreamId::new(stream)?;
    let headers = event_headers(headers)?;
    let version = event_version(&headers)?;
    Ok(NewEvent::new(stream, name, body, version).with_headers(headers))
}

/// GET /stream/{stream_id}[?snapshot=true]
///
/// JSON array of the stream's events in version order.
pub async fn read_stream(
    Extension(services): Extension<Arc<AppServices>>,
    Path(stream_id): Path<String>,
    Query(params): Query<ReadParams>,
) -> Response {
    let stream = match StreamId::new(stream_id) {
        Ok(stream) => stream,
        Err(err) => return store_error_to_response(err.into()),
    };

    match services.events.read_stream(&stream, params.snapshot).await {
        Ok(events) => Json(events).into_response(),
        Err(err) => store_error_to_response(err),
    }
}
