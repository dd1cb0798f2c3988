//! Pooled Postgres access: execution primitives over [`Query`] descriptors.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | `(stream, version)` already taken |
//! | Database (connection exception) | `08xxx` | `StorageUnavailable` | Backend dropped or refused the connection |
//! | Database (operator intervention) | `57Pxx` | `StorageUnavailable` | Server shutting down / restarting |
//! | Database (other) | Any other | `Database` | Propagated unchanged |
//! | PoolTimedOut / PoolClosed | N/A | `StorageUnavailable` | Pool exhausted or closed |
//! | Io / Tls / WorkerCrashed | N/A | `StorageUnavailable` | Network failures |
//! | Decode / ColumnDecode / ColumnNotFound | N/A | `Decode` | Row shape mismatch |
//! | Other | N/A | `Database` | Propagated unchanged |
//!
//! ## Thread Safety
//!
//! `StorageGateway` is `Clone + Send + Sync`; clones share one pool.

use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::{Arguments, PgPool};
use tracing::{debug, instrument};

use super::query::{Param, Query, Record, build_insert};
use super::r#trait::StoreError;

const UNIQUE_VIOLATION: &str = "23505";

/// Connection pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Owner of the pooled database connection.
#[derive(Debug, Clone)]
pub struct StorageGateway {
    pool: PgPool,
}

impl StorageGateway {
    /// Connect a new pool to `database_url`.
    #[instrument(skip(database_url), fields(max_connections = settings.max_connections), err)]
    pub async fn connect(database_url: &str, settings: PoolSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run a statement, returning the number of affected rows.
    #[instrument(skip(self, query), err)]
    pub async fn execute(&self, query: &Query) -> Result<u64, StoreError> {
        let args = arguments(query.params())?;
        let result = sqlx::query_with(query.sql(), args)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("execute", e))?;
        Ok(result.rows_affected())
    }

    /// Run statements in order inside a single transaction.
    #[instrument(skip(self, queries), fields(statements = queries.len()), err)]
    pub async fn execute_all(&self, queries: &[Query]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        for query in queries {
            let args = arguments(query.params())?;
            sqlx::query_with(query.sql(), args)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("execute_all", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    /// Open a cursor over raw rows.
    ///
    /// Rows are fetched lazily; columns are addressable by name through
    /// [`sqlx::Row::try_get`]. The cursor is single-pass.
    pub fn rows<'a>(&'a self, query: &'a Query) -> BoxStream<'a, Result<PgRow, StoreError>> {
        let args = match arguments(query.params()) {
            Ok(args) => args,
            Err(err) => return stream::once(async move { Err(err) }).boxed(),
        };

        sqlx::query_with(query.sql(), args)
            .fetch(&self.pool)
            .map(|row| row.map_err(|e| map_sqlx_error("fetch", e)))
            .boxed()
    }

    /// Lazily decode rows one at a time with `row_factory`.
    ///
    /// Finite unless the query itself is unbounded; nothing is buffered
    /// beyond the driver's own read-ahead.
    pub fn iterate<'a, T, F>(
        &'a self,
        query: &'a Query,
        row_factory: F,
    ) -> BoxStream<'a, Result<T, StoreError>>
    where
        T: Send + 'a,
        F: Fn(&PgRow) -> Result<T, sqlx::Error> + Send + 'a,
    {
        self.rows(query)
            .map(move |row| row.and_then(|row| row_factory(&row).map_err(|e| map_sqlx_error("decode", e))))
            .boxed()
    }

    /// First row decoded with `row_factory`, or `None` for an empty result.
    #[instrument(skip(self, query, row_factory), err)]
    pub async fn fetch_one<T, F>(&self, query: &Query, row_factory: F) -> Result<Option<T>, StoreError>
    where
        F: Fn(&PgRow) -> Result<T, sqlx::Error>,
    {
        let args = arguments(query.params())?;
        let row = sqlx::query_with(query.sql(), args)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_one", e))?;

        row.map(|row| row_factory(&row).map_err(|e| map_sqlx_error("decode", e)))
            .transpose()
    }

    /// Build and run a parameterized INSERT, decoding the returned row.
    #[instrument(skip(self, record, row_factory), err)]
    pub async fn insert<T, F>(&self, table: &str, record: &Record, row_factory: F) -> Result<T, StoreError>
    where
        F: Fn(&PgRow) -> Result<T, sqlx::Error>,
    {
        let query = build_insert(table, record)?;
        let args = arguments(query.params())?;
        let row = sqlx::query_with(query.sql(), args)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert", e))?;

        row_factory(&row).map_err(|e| map_sqlx_error("decode", e))
    }

    /// Close the pool. Further calls are no-ops.
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            debug!("closing storage pool");
            self.pool.close().await;
        }
    }
}

fn arguments(params: &[Param]) -> Result<PgArguments, StoreError> {
    let mut args = PgArguments::default();
    for (idx, param) in params.iter().enumerate() {
        let bound = match param {
            Param::Text(v) => args.add(v.clone()),
            Param::BigInt(v) => args.add(*v),
            Param::Json(v) => args.add(v.clone()),
        };
        bound.map_err(|e| StoreError::Encode(format!("parameter ${}: {e}", idx + 1)))?;
    }
    Ok(args)
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        let code = db_err.code().map(|c| c.into_owned());
        let msg = format!("database error in {}: {}", operation, db_err.message());

        match code.as_deref() {
            Some(UNIQUE_VIOLATION) => return StoreError::Conflict(msg),
            Some(code) if code.starts_with("08") || code.starts_with("57P") => {
                return StoreError::StorageUnavailable(msg);
            }
            _ => {}
        }
    }

    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => {
            StoreError::StorageUnavailable(format!("{} in {}", err, operation))
        }
        sqlx::Error::Decode(_) | sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Decode(format!("{} in {}", err, operation))
        }
        other => StoreError::Database(other),
    }
}
