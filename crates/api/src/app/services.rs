//! Storage backend wiring.

use std::sync::Arc;

use anyhow::Context;

use estore_infra::event_store::{EventLog, InMemoryEventLog, PostgresEventLog, StorageGateway, schema};
use estore_infra::{EventService, SubscriptionOptions};

use crate::config::{Backend, ServerConfig};

/// Backend-agnostic handle to the configured event log.
pub type SharedLog = Arc<dyn EventLog>;

pub struct AppServices {
    pub events: EventService<SharedLog>,
    pub backend: &'static str,
}

impl AppServices {
    pub fn new(log: SharedLog, options: SubscriptionOptions, backend: &'static str) -> Self {
        Self {
            events: EventService::new(log, options),
            backend,
        }
    }

    /// Process-local services with nothing persisted.
    pub fn in_memory(options: SubscriptionOptions) -> Self {
        Self::new(Arc::new(InMemoryEventLog::new()), options, "memory")
    }

    pub async fn close(&self) {
        self.events.close().await;
    }
}

/// Connect the configured backend, creating the schema when it is Postgres.
pub async fn build_services(config: &ServerConfig) -> anyhow::Result<AppServices> {
    match &config.backend {
        Backend::Memory => {
            tracing::warn!("ESTORE_BACKEND=memory; events are not persisted");
            Ok(AppServices::in_memory(config.subscription))
        }
        Backend::Postgres { database_url } => {
            let gateway = StorageGateway::connect(database_url, config.pool)
                .await
                .context("failed to connect to Postgres")?;
            schema::initialize(&gateway)
                .await
                .context("failed to initialize event schema")?;

            let log: SharedLog = Arc::new(PostgresEventLog::new(gateway));
            Ok(AppServices::new(log, config.subscription, "postgres"))
        }
    }
}
