//! Infrastructure layer: event log storage backends and the event service.

pub mod event_store;
pub mod service;

pub use event_store::{EventLog, InMemoryEventLog, PostgresEventLog, ReadMode, StorageGateway, StoreError};
pub use service::{EventService, Subscription, SubscriptionOptions, SubscriptionState};
