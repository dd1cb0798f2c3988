use std::sync::Arc;

use thiserror::Error;

use estore_core::{DomainError, Event, NewEvent, StreamId};

/// Event store operation error.
///
/// These are **infrastructure outcomes** as opposed to domain input errors.
/// Backends translate their driver errors into this taxonomy and let anything
/// they cannot classify propagate unchanged.
///
/// ## Error Categories
///
/// - **Conflict**: `(stream, version)` is already taken; the caller re-reads and retries
/// - **StorageUnavailable**: the backend could not be reached or the pool is exhausted
/// - **Database**: any other driver error, untouched
/// - **Encode / Decode**: a value could not cross the storage boundary
/// - **Invalid**: the append request failed domain validation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("failed to encode query parameter: {0}")]
    Encode(String),

    #[error("failed to decode event row: {0}")]
    Decode(String),

    #[error(transparent)]
    Invalid(#[from] DomainError),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::StorageUnavailable(_))
    }
}

/// Which slice of a stream a read returns.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Every event of the stream.
    #[default]
    Full,
    /// The most recent snapshot (if any) and every later event.
    SinceSnapshot,
}

impl From<bool> for ReadMode {
    fn from(use_snapshot: bool) -> Self {
        if use_snapshot {
            ReadMode::SinceSnapshot
        } else {
            ReadMode::Full
        }
    }
}

/// Append-only, globally ordered event log.
///
/// ## Append Semantics
///
/// `append()`:
/// - Persists exactly one event
/// - Assigns `id`, `seq` and `created` inside the backend (never by the caller)
/// - Fails with `StoreError::Conflict` if `(stream, version)` already exists,
///   leaving no partial effect
///
/// ## Read Semantics
///
/// `read_stream()` returns one stream ordered by `version` ascending, or an
/// empty vector if the stream has no events. Each call re-reads from scratch.
///
/// `read_feed()` returns events of all streams with `seq > after_seq`,
/// ordered by `seq`, at most `limit` of them. Repeated calls with the last
/// seen `seq` never skip or repeat an event.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - Keep `seq` strictly increasing in commit order (gaps allowed)
/// - Enforce `(stream, version)` uniqueness atomically
/// - Compute snapshot-compacted reads as "no later snapshot in the same stream"
#[async_trait::async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: NewEvent) -> Result<Event, StoreError>;

    async fn read_stream(&self, stream: &StreamId, mode: ReadMode) -> Result<Vec<Event>, StoreError>;

    async fn read_feed(&self, after_seq: i64, limit: usize) -> Result<Vec<Event>, StoreError>;

    /// Highest assigned `seq`, or 0 for an empty log.
    async fn head(&self) -> Result<i64, StoreError>;

    /// Release backend resources. Safe to call more than once.
    async fn close(&self) {}
}

#[async_trait::async_trait]
impl<S> EventLog for Arc<S>
where
    S: EventLog + ?Sized,
{
    async fn append(&self, event: NewEvent) -> Result<Event, StoreError> {
        (**self).append(event).await
    }

    async fn read_stream(&self, stream: &StreamId, mode: ReadMode) -> Result<Vec<Event>, StoreError> {
        (**self).read_stream(stream, mode).await
    }

    async fn read_feed(&self, after_seq: i64, limit: usize) -> Result<Vec<Event>, StoreError> {
        (**self).read_feed(after_seq, limit).await
    }

    async fn head(&self) -> Result<i64, StoreError> {
        (**self).head().await
    }

    async fn close(&self) {
        (**self).close().await
    }
}
