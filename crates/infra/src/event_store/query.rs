//! Parameterized query descriptors for the event table.
//!
//! Every function here is pure: it returns SQL text plus an ordered parameter
//! list and never touches the network. Execution lives in
//! [`StorageGateway`](super::gateway::StorageGateway).

use serde_json::Value as JsonValue;

use estore_core::{DomainError, SNAPSHOT_KIND, StreamId};

/// Table holding every event.
pub const EVENTS_TABLE: &str = "events";

/// Single-row table backing the global sequence counter.
pub const SEQUENCE_TABLE: &str = "events_seq";

/// Column list shared by every event read (matches the row decoder).
pub const EVENT_COLUMNS: &str = "id, seq, stream, created, version, name, body, headers";

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    BigInt(i64),
    Json(JsonValue),
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::BigInt(value)
    }
}

impl From<JsonValue> for Param {
    fn from(value: JsonValue) -> Self {
        Param::Json(value)
    }
}

/// SQL text plus its positional parameters (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    params: Vec<Param>,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

/// Ordered column → value mapping for an INSERT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Param)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, column: impl Into<String>, value: impl Into<Param>) -> Self {
        self.fields.push((column.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// All events of one stream, `version` ascending.
pub fn build_stream_query(stream: &StreamId) -> Query {
    Query::new(format!(
        "SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} WHERE stream = $1 ORDER BY version ASC"
    ))
    .bind(stream.as_str())
}

/// Events of one stream not shadowed by a later snapshot, `version` ascending.
///
/// An event is shadowed when a snapshot of the same stream exists with a
/// strictly greater version. The most recent snapshot is never shadowed, so
/// the result is that snapshot followed by everything after it. Without any
/// snapshot nothing is shadowed and the result equals [`build_stream_query`].
pub fn build_stream_snapshot_query(stream: &StreamId) -> Query {
    Query::new(format!(
        r#"
        SELECT e.id, e.seq, e.stream, e.created, e.version, e.name, e.body, e.headers
        FROM {EVENTS_TABLE} e
        LEFT JOIN {EVENTS_TABLE} s
            ON s.stream = e.stream
            AND s.version > e.version
            AND (s.name = $2 OR s.name LIKE $3)
        WHERE e.stream = $1
            AND s.id IS NULL
        ORDER BY e.version ASC
        "#
    ))
    .bind(stream.as_str())
    .bind(SNAPSHOT_KIND)
    .bind(format!("%.{SNAPSHOT_KIND}"))
}

/// Every event of every stream in global order.
pub fn build_feed_query() -> Query {
    Query::new(format!(
        "SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} ORDER BY seq ASC"
    ))
}

/// One page of the global feed strictly after `after_seq`.
pub fn build_feed_since_query(after_seq: i64, limit: i64) -> Query {
    Query::new(format!(
        "SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} WHERE seq > $1 ORDER BY seq ASC LIMIT $2"
    ))
    .bind(after_seq)
    .bind(limit)
}

/// Highest assigned `seq` (0 when the table is empty).
pub fn build_head_query() -> Query {
    Query::new(format!(
        "SELECT COALESCE(MAX(seq), 0)::BIGINT AS seq FROM {EVENTS_TABLE}"
    ))
}

/// INSERT of `record` into `table`, returning the stored row's event columns.
///
/// Table and column names are interpolated, so they must be plain identifiers.
pub fn build_insert(table: &str, record: &Record) -> Result<Query, DomainError> {
    ensure_identifier(table)?;
    if record.is_empty() {
        return Err(DomainError::validation(format!(
            "insert into {table} needs at least one field"
        )));
    }

    let mut columns = Vec::with_capacity(record.fields.len());
    let mut placeholders = Vec::with_capacity(record.fields.len());
    let mut query = Query::new(String::new());
    for (idx, (column, value)) in record.fields.iter().enumerate() {
        ensure_identifier(column)?;
        columns.push(column.as_str());
        placeholders.push(format!("${}", idx + 1));
        query = query.bind(value.clone());
    }

    query.sql = format!(
        "INSERT INTO {table} ({}) VALUES ({}) RETURNING {EVENT_COLUMNS}",
        columns.join(", "),
        placeholders.join(", ")
    );
    Ok(query)
}

fn ensure_identifier(name: &str) -> Result<(), DomainError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DomainError::validation(format!("invalid SQL identifier: {name:?}")))
    }
}
