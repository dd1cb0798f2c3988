use axum::{
    Router,
    routing::{get, post},
};

pub mod events;
pub mod subscribe;
pub mod system;

/// Router for every event store endpoint.
///
/// `stream` and `ws` are reserved first segments: the static routes win, so
/// appends to streams with those names are answered with 405.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/stream/:stream_id", get(events::read_stream))
        .route("/ws", get(subscribe::subscribe_now))
        .route("/ws/:start", get(subscribe::subscribe_from))
        .route("/:stream/:name", post(events::append))
}
