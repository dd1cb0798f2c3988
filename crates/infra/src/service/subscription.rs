//! Live, cancellable tail of the global event feed.
//!
//! A subscription is a background task polling [`EventLog::read_feed`] from a
//! cursor (the last delivered `seq`) and pushing events into a bounded
//! per-connection queue. The consumer drains the queue through
//! [`Subscription::next`] or the `Stream` impl.
//!
//! ## State machine
//!
//! `Created → Streaming → (Cancelled | Failed)`
//!
//! - `Cancelled`: the consumer called [`Subscription::cancel`], dropped the
//!   handle, or stopped receiving. No error is reported.
//! - `Failed`: a storage read failed. The error is queued as the final item.
//!
//! The task checks the cancellation token at every suspension point (feed
//! read, queue send, idle sleep) and never delivers after observing it.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use estore_core::Event;

use crate::event_store::{EventLog, StoreError};

/// Lifecycle of a subscription.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Created,
    Streaming,
    Cancelled,
    Failed,
}

impl SubscriptionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubscriptionState::Cancelled | SubscriptionState::Failed)
    }
}

/// Poll loop tuning.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Sleep between polls when the feed is drained.
    pub poll_interval: Duration,
    /// Maximum events fetched per poll. Zero is treated as one.
    pub batch_size: usize,
    /// Capacity of the per-connection queue. Zero is treated as one.
    pub buffer: usize,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            batch_size: 500,
            buffer: 64,
        }
    }
}

/// Consumer handle of a running subscription. Dropping it cancels the task.
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::Receiver<Result<Event, StoreError>>,
    cancel: CancellationToken,
    state: watch::Receiver<SubscriptionState>,
    start: i64,
}

impl Subscription {
    /// Spawn the poll task delivering every event with `seq > start`.
    pub(crate) fn spawn<L>(log: L, start: i64, options: SubscriptionOptions) -> Self
    where
        L: EventLog + 'static,
    {
        let options = SubscriptionOptions {
            batch_size: options.batch_size.max(1),
            buffer: options.buffer.max(1),
            ..options
        };
        let (tx, rx) = mpsc::channel(options.buffer);
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Created);
        let cancel = CancellationToken::new();

        let task = run(log, start, options, tx, cancel.clone(), state_tx);
        tokio::spawn(task.instrument(info_span!("subscription", start)));

        Self {
            rx,
            cancel,
            state: state_rx,
            start,
        }
    }

    /// Next event, a final error, or `None` once the task has stopped.
    pub async fn next(&mut self) -> Option<Result<Event, StoreError>> {
        self.rx.recv().await
    }

    /// Ask the poll task to stop. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    /// Exclusive starting offset this subscription resolved to.
    pub fn start(&self) -> i64 {
        self.start
    }

    /// Wait until the task reaches `Cancelled` or `Failed`.
    pub async fn stopped(&mut self) -> SubscriptionState {
        let state = self
            .state
            .wait_for(|s| s.is_terminal())
            .await
            .map(|s| *s);
        // The sender only drops after publishing a terminal state.
        state.unwrap_or(SubscriptionState::Cancelled)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Stream for Subscription {
    type Item = Result<Event, StoreError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

async fn run<L: EventLog>(
    log: L,
    start: i64,
    options: SubscriptionOptions,
    tx: mpsc::Sender<Result<Event, StoreError>>,
    cancel: CancellationToken,
    state: watch::Sender<SubscriptionState>,
) {
    state.send_replace(SubscriptionState::Streaming);
    debug!("subscription streaming");

    let outcome = poll_feed(&log, start, options, &tx, &cancel).await;

    match outcome {
        Ok(()) => {
            debug!("subscription cancelled");
            state.send_replace(SubscriptionState::Cancelled);
        }
        Err(err) => {
            warn!(error = %err, "subscription failed");
            state.send_replace(SubscriptionState::Failed);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tx.send(Err(err)) => {}
            }
        }
    }
}

/// Returns `Ok(())` on cancellation, `Err` on a storage failure.
async fn poll_feed<L: EventLog>(
    log: &L,
    start: i64,
    options: SubscriptionOptions,
    tx: &mpsc::Sender<Result<Event, StoreError>>,
    cancel: &CancellationToken,
) -> Result<(), StoreError> {
    let mut cursor = start;

    loop {
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(()),
            batch = log.read_feed(cursor, options.batch_size) => batch?,
        };

        let drained = batch.len() < options.batch_size;

        for event in batch {
            let seq = event.seq;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                sent = tx.send(Ok(event)) => {
                    if sent.is_err() {
                        // Consumer is gone.
                        return Ok(());
                    }
                }
            }
            cursor = seq;
        }

        if drained {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(options.poll_interval) => {}
            }
        }
    }
}
