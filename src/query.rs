//! Parameterized statement execution against a single connection.
//!
//! Statements run through the connection's prepared-statement cache
//! (`prepare_cached`), so repeated SQL text is compiled once per connection.
//! Row-returning statements produce JSON-shaped rows; everything else produces
//! a mutation summary.

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection, ToSql};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An owned SQL parameter value, serializable for result-cache fingerprints
/// and slow-query records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value};
        Ok(match self {
            SqlParam::Null => ToSqlOutput::Owned(Value::Null),
            SqlParam::Integer(n) => ToSqlOutput::Owned(Value::Integer(*n)),
            SqlParam::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlParam::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlParam::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Integer(value)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        SqlParam::Real(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl From<Vec<u8>> for SqlParam {
    fn from(value: Vec<u8>) -> Self {
        SqlParam::Blob(value)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

/// One result row: column name to JSON value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Outcome of a single statement execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    /// Rows produced by a `SELECT`-like statement.
    Rows(Vec<Row>),
    /// Summary of a mutation (`INSERT`/`UPDATE`/`DELETE`/DDL).
    Mutation {
        rows_affected: usize,
        last_insert_rowid: i64,
    },
}

impl QueryOutcome {
    /// The rows of a `Rows` outcome, or an empty slice for mutations.
    pub fn rows(&self) -> &[Row] {
        match self {
            QueryOutcome::Rows(rows) => rows,
            QueryOutcome::Mutation { .. } => &[],
        }
    }
}

/// Per-call execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Consult the result cache before borrowing a connection.
    pub use_cache: bool,
    /// Store a successful result under its fingerprint for this long.
    /// Ignored unless `use_cache` is set.
    pub cache_ttl: Option<Duration>,
}

impl QueryOptions {
    /// Options for a cache-enabled query with the given TTL.
    pub fn cached(ttl: Duration) -> Self {
        Self {
            use_cache: true,
            cache_ttl: Some(ttl),
        }
    }
}

/// Whether the statement's leading keyword produces rows.
pub(crate) fn returns_rows(sql: &str) -> bool {
    let keyword = sql
        .trim_start()
        .split_whitespace()
        .next()
        .map(|word| word.to_ascii_uppercase());
    matches!(
        keyword.as_deref(),
        Some("SELECT" | "WITH" | "VALUES" | "PRAGMA" | "EXPLAIN")
    )
}

fn value_ref_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(n) => serde_json::Value::from(n),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(text) => {
            serde_json::Value::String(String::from_utf8_lossy(text).into_owned())
        }
        ValueRef::Blob(blob) => {
            serde_json::Value::Array(blob.iter().map(|&b| serde_json::Value::from(b)).collect())
        }
    }
}

/// Execute one parameterized statement on the given connection.
pub(crate) fn run_statement(
    conn: &Connection,
    sql: &str,
    params: &[SqlParam],
) -> Result<QueryOutcome, rusqlite::Error> {
    let mut stmt = conn.prepare_cached(sql)?;

    if returns_rows(sql) {
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                record.insert(name.clone(), value_ref_to_json(row.get_ref(idx)?));
            }
            out.push(record);
        }
        Ok(QueryOutcome::Rows(out))
    } else {
        let rows_affected = stmt.execute(params_from_iter(params.iter()))?;
        drop(stmt);
        Ok(QueryOutcome::Mutation {
            rows_affected,
            last_insert_rowid: conn.last_insert_rowid(),
        })
    }
}
