//! Domain-level API over an [`EventLog`].
//!
//! The service adds validation and tracing but no recovery logic: storage
//! outcomes (conflicts, outages) pass through unchanged.

pub mod subscription;

use tracing::instrument;

use estore_core::{Event, Headers, NewEvent, StreamId};

use crate::event_store::{EventLog, ReadMode, StoreError};

pub use subscription::{Subscription, SubscriptionOptions, SubscriptionState};

/// Append, read and subscribe operations over one event log.
#[derive(Debug, Clone)]
pub struct EventService<L> {
    log: L,
    options: SubscriptionOptions,
}

impl<L> EventService<L>
where
    L: EventLog + Clone + 'static,
{
    pub fn new(log: L, options: SubscriptionOptions) -> Self {
        Self { log, options }
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Append one event. `seq`, `id` and `created` are assigned by storage.
    ///
    /// Fails with `Conflict` if `(stream, version)` is taken and with
    /// `StorageUnavailable` if storage cannot be reached.
    #[instrument(skip(self, event), fields(stream = %event.stream, version = event.version, name = %event.name), err)]
    pub async fn append(&self, event: NewEvent) -> Result<Event, StoreError> {
        event.validate()?;
        self.log.append(event).await
    }

    /// Convenience form of [`append`](Self::append) taking the fields directly.
    pub async fn append_parts(
        &self,
        stream: StreamId,
        name: impl Into<String>,
        body: serde_json::Value,
        headers: Headers,
        version: i64,
    ) -> Result<Event, StoreError> {
        self.append(NewEvent::new(stream, name, body, version).with_headers(headers))
            .await
    }

    /// Full or snapshot-compacted history of one stream, `version` ascending.
    ///
    /// A stream without events yields an empty vector.
    #[instrument(skip(self), fields(stream = %stream), err)]
    pub async fn read_stream(&self, stream: &StreamId, use_snapshot: bool) -> Result<Vec<Event>, StoreError> {
        self.log.read_stream(stream, ReadMode::from(use_snapshot)).await
    }

    /// Tail every event appended after `start` (exclusive), or after the
    /// current head when `start` is `None`.
    ///
    /// The starting point is resolved before this returns, so anything
    /// appended afterwards is delivered.
    #[instrument(skip(self), err)]
    pub async fn subscribe(&self, start: Option<i64>) -> Result<Subscription, StoreError> {
        let start = match start {
            Some(offset) => offset,
            None => self.log.head().await?,
        };
        Ok(Subscription::spawn(self.log.clone(), start, self.options))
    }

    /// Release storage resources.
    pub async fn close(&self) {
        self.log.close().await;
    }
}
