//! Append-only event log boundary.
//!
//! - `query`: pure SQL descriptors (no I/O)
//! - `gateway`: pooled execution + driver error translation
//! - `schema`: idempotent DDL bootstrap
//! - `postgres` / `in_memory`: the two `EventLog` backends

pub mod gateway;
pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod schema;
pub mod r#trait;

pub use gateway::{PoolSettings, StorageGateway};
pub use in_memory::InMemoryEventLog;
pub use postgres::PostgresEventLog;
pub use query::{Param, Query, Record};
pub use r#trait::{EventLog, ReadMode, StoreError};
