//! The persisted event and the append request that produces it.
//!
//! ## Event Lifecycle
//!
//! 1. **NewEvent**: built by a caller (stream, name, body, headers, version)
//! 2. **Event**: persisted; storage assigns `id`, `seq` and `created`
//!
//! Events are never mutated or deleted once written.
//!
//! ## Snapshots
//!
//! An event whose kind (the suffix after the last `.` of its `name`) is
//! `Snapshot` carries cumulative stream state up to and including its
//! `version`. Snapshot-compacted reads start at the most recent one.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};
use crate::id::{EventId, StreamId};

/// Event metadata (tracing, causation, correlation). Empty by default.
pub type Headers = BTreeMap<String, String>;

/// Kind suffix that marks a compaction snapshot.
pub const SNAPSHOT_KIND: &str = "Snapshot";

/// Kind of an event: the suffix after the last `.` of its dotted name.
///
/// A name without dots is its own kind.
pub fn event_kind(name: &str) -> &str {
    name.rsplit_once('.').map(|(_, kind)| kind).unwrap_or(name)
}

/// Whether an event name marks a compaction snapshot.
pub fn is_snapshot_name(name: &str) -> bool {
    event_kind(name) == SNAPSHOT_KIND
}

/// An event ready to be appended (storage has not assigned `id`, `seq`, `created`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub stream: StreamId,
    pub name: String,
    pub body: JsonValue,
    #[serde(default)]
    pub headers: Headers,
    /// Caller-proposed position within the stream; unique per stream.
    pub version: i64,
}

impl NewEvent {
    pub fn new(stream: StreamId, name: impl Into<String>, body: JsonValue, version: i64) -> Self {
        Self {
            stream,
            name: name.into(),
            body,
            headers: Headers::new(),
            version,
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Reject requests that can never be stored.
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("event name must not be blank"));
        }
        if event_kind(&self.name).is_empty() {
            return Err(DomainError::validation(format!(
                "event name '{}' has an empty kind",
                self.name
            )));
        }
        Ok(())
    }

    pub fn is_snapshot(&self) -> bool {
        is_snapshot_name(&self.name)
    }
}

/// A persisted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Global total order across all streams; strictly increasing, gaps allowed.
    pub seq: i64,
    pub stream: StreamId,
    pub created: DateTime<Utc>,
    pub version: i64,
    pub name: String,
    pub body: JsonValue,
    #[serde(default)]
    pub headers: Headers,
}

impl Event {
    pub fn kind(&self) -> &str {
        event_kind(&self.name)
    }

    pub fn is_snapshot(&self) -> bool {
        is_snapshot_name(&self.name)
    }
}
