//! WebSocket live subscription.
//!
//! Each connection owns one [`Subscription`]. Events are sent as JSON text
//! frames in `seq` order. A storage failure sends a final
//! `{"error", "message"}` frame and closes the socket with code 1011. A
//! client close (or a dead socket) cancels the subscription.

use std::sync::Arc;

use axum::{
    extract::{
        Extension, Path,
        ws::{CloseFrame, Message, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, warn};

use estore_infra::{StoreError, Subscription};

use crate::app::errors::{store_error_status, store_error_to_response};
use crate::app::services::AppServices;

/// GET /ws
pub async fn subscribe_now(
    ws: WebSocketUpgrade,
    Extension(services): Extension<Arc<AppServices>>,
) -> Response {
    upgrade(ws, &services, None).await
}

/// GET /ws/{start}
pub async fn subscribe_from(
    Path(start): Path<i64>,
    Extension(services): Extension<Arc<AppServices>>,
    ws: WebSocketUpgrade,
) -> Response {
    upgrade(ws, &services, Some(start)).await
}

async fn upgrade(ws: WebSocketUpgrade, services: &AppServices, start: Option<i64>) -> Response {
    // Resolve the starting point before the handshake so "now" is fixed at
    // request time and storage errors still get an HTTP status.
    let subscription = match services.events.subscribe(start).await {
        Ok(subscription) => subscription,
        Err(err) => return store_error_to_response(err),
    };

    ws.on_upgrade(move |socket| {
        let (tx, rx) = socket.split();
        forward(tx, rx, subscription)
    })
}

/// Drain `subscription` into `tx` until either side stops.
pub(crate) async fn forward<Tx, Rx, E>(mut tx: Tx, mut rx: Rx, mut subscription: Subscription)
where
    Tx: Sink<Message> + Unpin,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
{
    let start = subscription.start();
    debug!(start, "websocket subscriber connected");

    loop {
        tokio::select! {
            item = subscription.next() => match item {
                Some(Ok(event)) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(seq = event.seq, error = %e, "failed to encode event");
                            break;
                        }
                    };
                    if tx.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Some(Err(err)) => {
                    send_error(&mut tx, err).await;
                    break;
                }
                None => break,
            },
            incoming = rx.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Client frames carry no meaning; pings are answered by axum.
                Some(Ok(_)) => {}
            },
        }
    }

    subscription.cancel();
    debug!(start, state = ?subscription.state(), "websocket subscriber disconnected");
}

async fn send_error<Tx>(tx: &mut Tx, err: StoreError)
where
    Tx: Sink<Message> + Unpin,
{
    warn!(error = %err, "subscription failed; closing socket");
    let (_, code) = store_error_status(&err);
    let frame = serde_json::json!({ "error": code, "message": err.to_string() });

    let _ = tx.send(Message::Text(frame.to_string())).await;
    let _ = tx
        .send(Message::Close(Some(CloseFrame {
            code: close_code::ERROR,
            reason: "subscription failed".into(),
        })))
        .await;
}
