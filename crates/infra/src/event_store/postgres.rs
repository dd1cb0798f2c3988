//! Postgres-backed event log.
//!
//! Reads go through the pure query builders in [`super::query`]; execution and
//! error translation go through [`StorageGateway`]. Uniqueness of
//! `(stream, version)` and the global `seq` order are enforced by the database
//! itself (see [`super::schema`]); nothing here computes a `seq`.

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use tracing::{Span, instrument};

use estore_core::{DomainError, Event, EventId, Headers, NewEvent, StreamId};

use super::gateway::StorageGateway;
use super::query::{
    EVENTS_TABLE, Record, build_feed_since_query, build_head_query, build_stream_query,
    build_stream_snapshot_query,
};
use super::r#trait::{EventLog, ReadMode, StoreError};

/// Postgres-backed append-only event log.
///
/// ## Thread Safety
///
/// Clones share the gateway's connection pool; every operation checks out a
/// pooled connection for the duration of one statement.
#[derive(Debug, Clone)]
pub struct PostgresEventLog {
    gateway: StorageGateway,
}

impl PostgresEventLog {
    pub fn new(gateway: StorageGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }
}

#[async_trait::async_trait]
impl EventLog for PostgresEventLog {
    #[instrument(
        skip(self, event),
        fields(stream = %event.stream, version = event.version, name = %event.name, seq = tracing::field::Empty),
        err
    )]
    async fn append(&self, event: NewEvent) -> Result<Event, StoreError> {
        let headers = serde_json::to_value(&event.headers)
            .map_err(|e| StoreError::Encode(format!("headers: {e}")))?;

        let record = Record::new()
            .field("stream", event.stream.into_inner())
            .field("version", event.version)
            .field("name", event.name)
            .field("body", event.body)
            .field("headers", headers);

        let stored = self.gateway.insert(EVENTS_TABLE, &record, decode_event).await?;

        Span::current().record("seq", stored.seq);
        Ok(stored)
    }

    #[instrument(skip(self), fields(stream = %stream, event_count = tracing::field::Empty), err)]
    async fn read_stream(&self, stream: &StreamId, mode: ReadMode) -> Result<Vec<Event>, StoreError> {
        let query = match mode {
            ReadMode::Full => build_stream_query(stream),
            ReadMode::SinceSnapshot => build_stream_snapshot_query(stream),
        };

        let events: Vec<Event> = self.gateway.iterate(&query, decode_event).try_collect().await?;

        Span::current().record("event_count", events.len());
        Ok(events)
    }

    #[instrument(level = "trace", skip(self), err)]
    async fn read_feed(&self, after_seq: i64, limit: usize) -> Result<Vec<Event>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let query = build_feed_since_query(after_seq, limit);
        self.gateway.iterate(&query, decode_event).try_collect().await
    }

    #[instrument(skip(self), err)]
    async fn head(&self) -> Result<i64, StoreError> {
        let head = self
            .gateway
            .fetch_one(&build_head_query(), |row: &PgRow| row.try_get::<i64, _>("seq"))
            .await?;
        Ok(head.unwrap_or(0))
    }

    async fn close(&self) {
        self.gateway.close().await;
    }
}

// SQLx row types

#[derive(Debug)]
struct EventRow {
    id: uuid::Uuid,
    seq: i64,
    stream: String,
    created: DateTime<Utc>,
    version: i64,
    name: String,
    body: serde_json::Value,
    headers: serde_json::Value,
}

impl<'r> FromRow<'r, PgRow> for EventRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(EventRow {
            id: row.try_get("id")?,
            seq: row.try_get("seq")?,
            stream: row.try_get("stream")?,
            created: row.try_get("created")?,
            version: row.try_get("version")?,
            name: row.try_get("name")?,
            body: row.try_get("body")?,
            headers: row.try_get("headers")?,
        })
    }
}

impl TryFrom<EventRow> for Event {
    type Error = DomainError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let headers: Headers = serde_json::from_value(row.headers)
            .map_err(|e| DomainError::validation(format!("headers column: {e}")))?;

        Ok(Event {
            id: EventId::from_uuid(row.id),
            seq: row.seq,
            stream: StreamId::new(row.stream)?,
            created: row.created,
            version: row.version,
            name: row.name,
            body: row.body,
            headers,
        })
    }
}

/// Row factory for every event-shaped query.
fn decode_event(row: &PgRow) -> Result<Event, sqlx::Error> {
    let row = EventRow::from_row(row)?;
    Event::try_from(row).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}
