//! `estore-core`: event-log domain building blocks.
//!
//! This crate contains **pure domain** types (no infrastructure concerns):
//! the persisted `Event`, the append request `NewEvent`, identifiers, and the
//! snapshot naming rule shared by every storage backend.

pub mod error;
pub mod event;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use event::{Event, Headers, NewEvent, SNAPSHOT_KIND, event_kind, is_snapshot_name};
pub use id::{EventId, StreamId};
