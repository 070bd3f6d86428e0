//! SurrealDB implementation of [`BatchRepository`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use exto_core::error::ExtoResult;
use exto_core::models::batch::{Batch, BatchStatus, CreateBatch};
use exto_core::repository::{BatchRepository, PaginatedResult, Pagination};
use exto_core::tenant::TenantNamespace;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::query::{CountRow, DEFAULT_QUERY_TIMEOUT, parse_uuid, rows_or_empty, timed};
use crate::tenant::{ensure_tenant_tables, require_tenant};

#[derive(Debug, SurrealValue)]
struct BatchRow {
    name: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct BatchRowWithId {
    record_id: String,
    name: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BatchRow {
    fn into_batch(self, id: Uuid) -> Result<Batch, DbError> {
        Ok(Batch {
            id,
            name: self.name,
            status: self.status.parse().map_err(DbError::Decode)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl BatchRowWithId {
    fn try_into_batch(self) -> Result<Batch, DbError> {
        Ok(Batch {
            id: parse_uuid("batch", &self.record_id)?,
            name: self.name,
            status: self.status.parse().map_err(DbError::Decode)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn not_found(id: impl ToString) -> DbError {
    DbError::NotFound {
        entity: "batch".into(),
        id: id.to_string(),
    }
}

/// SurrealDB implementation of the Batch repository.
#[derive(Clone)]
pub struct SurrealBatchRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealBatchRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            db,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn page(&self, table: &str, pagination: Pagination) -> Result<Vec<Batch>, DbError> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM type::table($tb) \
                     ORDER BY created_at DESC \
                     LIMIT $limit START $offset",
                )
                .bind(("tb", table.to_string()))
                .bind(("limit", pagination.limit))
                .bind(("offset", pagination.offset)),
        )
        .await?;
        let rows: Vec<BatchRowWithId> = rows_or_empty(result.take(0))?;
        rows.into_iter().map(|r| r.try_into_batch()).collect()
    }

    async fn count_in(&self, table: &str) -> Result<u64, DbError> {
        let mut result = timed(
            self.timeout,
            self.db
                .query("SELECT count() AS total FROM type::table($tb) GROUP ALL")
                .bind(("tb", table.to_string())),
        )
        .await?;
        let rows: Vec<CountRow> = rows_or_empty(result.take(0))?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}

impl<C: Connection> BatchRepository for SurrealBatchRepository<C> {
    async fn create(&self, tenant: &TenantNamespace, input: CreateBatch) -> ExtoResult<Batch> {
        ensure_tenant_tables(&self.db, self.timeout, tenant).await?;

        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = timed(
            self.timeout,
            self.db
                .query(
                    "CREATE type::record($tb, $id) SET \
                     name = $name, status = $status, \
                     created_at = time::now(), updated_at = time::now()",
                )
                .bind(("tb", tenant.batches()))
                .bind(("id", id_str.clone()))
                .bind(("name", input.name))
                .bind(("status", BatchStatus::Open.as_str().to_string())),
        )
        .await?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<BatchRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_batch(id)?)
    }

    async fn get_by_id(&self, tenant: &TenantNamespace, id: Uuid) -> ExtoResult<Batch> {
        require_tenant(tenant)?;
        let id_str = id.to_string();

        let mut result = timed(
            self.timeout,
            self.db
                .query("SELECT * FROM type::record($tb, $id)")
                .bind(("tb", tenant.batches()))
                .bind(("id", id_str.clone())),
        )
        .await?;

        let rows: Vec<BatchRow> = rows_or_empty(result.take(0))?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_batch(id)?)
    }

    async fn list(
        &self,
        tenant: &TenantNamespace,
        pagination: Pagination,
    ) -> ExtoResult<PaginatedResult<Batch>> {
        require_tenant(tenant)?;
        let table = tenant.batches();
        let (items, total) =
            tokio::try_join!(self.page(&table, pagination), self.count_in(&table))?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn transition(
        &self,
        tenant: &TenantNamespace,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
    ) -> ExtoResult<Option<Batch>> {
        require_tenant(tenant)?;

        let result = timed(
            self.timeout,
            self.db
                .query(
                    "UPDATE type::record($tb, $id) SET \
                     status = $to, updated_at = time::now() \
                     WHERE status = $from",
                )
                .bind(("tb", tenant.batches()))
                .bind(("id", id.to_string()))
                .bind(("from", from.as_str().to_string()))
                .bind(("to", to.as_str().to_string())),
        )
        .await?;

        let rows: Vec<BatchRow> = match result.check() {
            Ok(mut checked) => checked.take(0).map_err(DbError::from)?,
            Err(e) => {
                let err = DbError::Query(e.to_string());
                if !err.is_missing_table() {
                    return Err(err.into());
                }
                Vec::new()
            }
        };

        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.into_batch(id))
            .transpose()?)
    }
}
