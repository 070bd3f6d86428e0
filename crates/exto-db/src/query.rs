//! Shared helpers for bounded query execution and row decoding.

use std::future::IntoFuture;
use std::time::Duration;

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// Per-call bound applied to every repository query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Awaits a SurrealDB call, failing with [`DbError::Timeout`] once
/// `limit` elapses.
pub(crate) async fn timed<F, T>(limit: Duration, call: F) -> Result<T, DbError>
where
    F: IntoFuture<Output = Result<T, surrealdb::Error>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(DbError::from),
        Err(_) => Err(DbError::Timeout(limit)),
    }
}

/// Rows taken from a tenant-table read. A table that has not been
/// defined yet holds no rows.
pub(crate) fn rows_or_empty<T>(
    taken: Result<Vec<T>, surrealdb::Error>,
) -> Result<Vec<T>, DbError> {
    match taken.map_err(DbError::from) {
        Err(e) if e.is_missing_table() => Ok(Vec::new()),
        other => other,
    }
}

pub(crate) fn parse_uuid(field: &str, raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::Decode(format!("invalid {field} UUID: {e}")))
}

pub(crate) fn parse_opt_uuid(field: &str, raw: Option<String>) -> Result<Option<Uuid>, DbError> {
    raw.map(|s| parse_uuid(field, &s)).transpose()
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub total: u64,
}
