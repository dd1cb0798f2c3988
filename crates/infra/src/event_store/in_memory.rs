use std::collections::HashSet;
use std::sync::RwLock;

use chrono::Utc;

use estore_core::{Event, EventId, NewEvent, StreamId};

use super::r#trait::{EventLog, ReadMode, StoreError};

#[derive(Debug, Default)]
struct LogState {
    /// Every event in `seq` order.
    events: Vec<Event>,
    /// Taken `(stream, version)` pairs.
    versions: HashSet<(StreamId, i64)>,
    last_seq: i64,
}

/// In-memory append-only event log.
///
/// Intended for tests/dev. Honours the same invariants as the Postgres
/// backend; not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    state: RwLock<LogState>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::StorageUnavailable("in-memory log lock poisoned".to_string())
    }
}

#[async_trait::async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, event: NewEvent) -> Result<Event, StoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;

        let key = (event.stream.clone(), event.version);
        if state.versions.contains(&key) {
            return Err(StoreError::Conflict(format!(
                "stream '{}' already has version {}",
                event.stream, event.version
            )));
        }

        state.last_seq += 1;
        let stored = Event {
            id: EventId::new(),
            seq: state.last_seq,
            stream: event.stream,
            created: Utc::now(),
            version: event.version,
            name: event.name,
            body: event.body,
            headers: event.headers,
        };

        state.versions.insert(key);
        state.events.push(stored.clone());
        Ok(stored)
    }

    async fn read_stream(&self, stream: &StreamId, mode: ReadMode) -> Result<Vec<Event>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;

        let mut events: Vec<Event> = state
            .events
            .iter()
            .filter(|e| &e.stream == stream)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.version);

        if mode == ReadMode::SinceSnapshot {
            // Same anti-join as the SQL variant: drop events shadowed by a later snapshot.
            let latest_snapshot = events
                .iter()
                .filter(|e| e.is_snapshot())
                .map(|e| e.version)
                .max();
            if let Some(snapshot_version) = latest_snapshot {
                events.retain(|e| e.version >= snapshot_version);
            }
        }

        Ok(events)
    }

    async fn read_feed(&self, after_seq: i64, limit: usize) -> Result<Vec<Event>, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;

        let start = state.events.partition_point(|e| e.seq <= after_seq);
        Ok(state.events[start..].iter().take(limit).cloned().collect())
    }

    async fn head(&self) -> Result<i64, StoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.last_seq)
    }
}
