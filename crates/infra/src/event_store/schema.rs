//! Schema bootstrap for the event table and the global sequence counter.
//!
//! Every statement is guarded (`IF NOT EXISTS`, `OR REPLACE`,
//! `ON CONFLICT DO NOTHING`) so re-running against a ready database changes
//! nothing and never touches stored events.
//!
//! `next_seq()` increments a single counter row. The row lock it takes is held
//! until the inserting transaction ends, so concurrent appends obtain their
//! `seq` in commit order and a failed insert rolls its increment back.

use tracing::{info, instrument};

use super::gateway::StorageGateway;
use super::query::{EVENTS_TABLE, Query, SEQUENCE_TABLE};
use super::r#trait::StoreError;

/// Lock key serialising concurrent schema bootstraps across processes.
const SCHEMA_LOCK_KEY: i64 = 0x6573_746f_7265;

/// DDL statements in execution order.
pub fn schema_statements() -> Vec<Query> {
    vec![
        Query::new("SELECT pg_advisory_xact_lock($1)").bind(SCHEMA_LOCK_KEY),
        Query::new("CREATE EXTENSION IF NOT EXISTS pgcrypto"),
        Query::new(format!(
            r#"
            CREATE TABLE IF NOT EXISTS {SEQUENCE_TABLE} (
                singleton BOOLEAN PRIMARY KEY DEFAULT TRUE CHECK (singleton),
                value BIGINT NOT NULL
            )
            "#
        )),
        Query::new(format!(
            "INSERT INTO {SEQUENCE_TABLE} (singleton, value) VALUES (TRUE, 0) ON CONFLICT (singleton) DO NOTHING"
        )),
        Query::new(format!(
            r#"
            CREATE OR REPLACE FUNCTION next_seq() RETURNS BIGINT
            LANGUAGE sql VOLATILE
            AS $$
                UPDATE {SEQUENCE_TABLE} SET value = value + 1 WHERE singleton RETURNING value
            $$
            "#
        )),
        Query::new(format!(
            r#"
            CREATE TABLE IF NOT EXISTS {EVENTS_TABLE} (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                seq BIGINT NOT NULL UNIQUE DEFAULT next_seq(),
                stream TEXT NOT NULL,
                created TIMESTAMPTZ NOT NULL DEFAULT now(),
                version BIGINT NOT NULL,
                name TEXT NOT NULL,
                body JSONB NOT NULL,
                headers JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                CONSTRAINT {EVENTS_TABLE}_stream_version_key UNIQUE (stream, version)
            )
            "#
        )),
        Query::new(format!(
            "CREATE INDEX IF NOT EXISTS {EVENTS_TABLE}_stream_idx ON {EVENTS_TABLE} (stream)"
        )),
    ]
}

/// Bring an empty database to a ready state. Idempotent.
///
/// Any failure here is fatal for startup; nothing is retried.
#[instrument(skip(gateway), err)]
pub async fn initialize(gateway: &StorageGateway) -> Result<(), StoreError> {
    let statements = schema_statements();
    gateway.execute_all(&statements).await?;
    info!(statements = statements.len(), "event store schema ready");
    Ok(())
}
