//! SurrealDB implementation of [`ScanHistoryRepository`].
//!
//! [`ScanHistoryRepository::record`] writes the category-data record and
//! the scan-history entry in one transaction, so an entry never points at
//! a record that does not exist.

use std::time::Duration;

use chrono::{DateTime, Utc};
use exto_core::error::ExtoResult;
use exto_core::models::category_data::CreateCategoryData;
use exto_core::models::scan_history::{CreateScanHistory, ScanHistory};
use exto_core::repository::{PaginatedResult, Pagination, RecordedScan, ScanHistoryRepository};
use exto_core::tenant::TenantNamespace;
use serde_json::Value;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::category_data;
use crate::error::DbError;
use crate::query::{
    CountRow, DEFAULT_QUERY_TIMEOUT, parse_opt_uuid, parse_uuid, rows_or_empty, timed,
};
use crate::tenant::{ensure_data_collection, ensure_tenant_tables, require_tenant};

const RECORD_SQL: &str = "\
BEGIN TRANSACTION;
CREATE type::record($data_tb, $data_id) SET
    category_id = $category_id, format_id = $format_id,
    metadata = $metadata, raw_data = $raw_data,
    document_paths = $document_paths, organization_id = $organization_id,
    created_at = time::now(), updated_at = time::now();
CREATE type::record($history_tb, $history_id) SET
    category_id = $category_id, format_id = $format_id,
    scan_code = $scan_code, category_data_col = $category_data_col,
    category_data_id = $data_id, batch_id = $batch_id,
    thumbnails = $thumbnails, created_at = time::now();
COMMIT TRANSACTION;
";

#[derive(Debug, SurrealValue)]
struct ScanHistoryRowWithId {
    record_id: String,
    category_id: String,
    format_id: Option<String>,
    scan_code: String,
    category_data_col: String,
    category_data_id: String,
    batch_id: String,
    thumbnails: Vec<String>,
    created_at: DateTime<Utc>,
}

impl ScanHistoryRowWithId {
    fn try_into_scan_history(self) -> Result<ScanHistory, DbError> {
        Ok(ScanHistory {
            id: parse_uuid("scan history", &self.record_id)?,
            category_id: parse_uuid("category", &self.category_id)?,
            format_id: parse_opt_uuid("format", self.format_id)?,
            scan_code: self.scan_code,
            category_data_col: self.category_data_col,
            category_data_id: parse_uuid("category data", &self.category_data_id)?,
            batch_id: parse_uuid("batch", &self.batch_id)?,
            thumbnails: self.thumbnails,
            created_at: self.created_at,
        })
    }
}

/// SurrealDB implementation of the ScanHistory repository.
#[derive(Clone)]
pub struct SurrealScanHistoryRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealScanHistoryRepository<C> {
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

    async fn fetch(&self, table: &str, id: Uuid) -> Result<ScanHistory, DbError> {
        let id_str = id.to_string();
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * \
                     FROM type::record($tb, $id)",
                )
                .bind(("tb", table.to_string()))
                .bind(("id", id_str.clone())),
        )
        .await?;
        let rows: Vec<ScanHistoryRowWithId> = rows_or_empty(result.take(0))?;
        rows.into_iter()
            .next()
            .ok_or(DbError::NotFound {
                entity: "scan_history".into(),
                id: id_str,
            })?
            .try_into_scan_history()
    }

    async fn page(&self, table: &str, pagination: Pagination) -> Result<Vec<ScanHistory>, DbError> {
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
        let rows: Vec<ScanHistoryRowWithId> = rows_or_empty(result.take(0))?;
        rows.into_iter()
            .map(|r| r.try_into_scan_history())
            .collect()
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

impl<C: Connection> ScanHistoryRepository for SurrealScanHistoryRepository<C> {
    async fn record(
        &self,
        tenant: &TenantNamespace,
        data: CreateCategoryData,
        history: CreateScanHistory,
    ) -> ExtoResult<RecordedScan> {
        ensure_tenant_tables(&self.db, self.timeout, tenant).await?;
        ensure_data_collection(&self.db, self.timeout, tenant, &history.category_data_col).await?;

        let data_table = tenant.collection(&history.category_data_col);
        let history_table = tenant.scan_histories();
        let data_id = Uuid::new_v4();
        let history_id = Uuid::new_v4();

        timed(
            self.timeout,
            self.db
                .query(RECORD_SQL)
                .bind(("data_tb", data_table.clone()))
                .bind(("data_id", data_id.to_string()))
                .bind(("history_tb", history_table.clone()))
                .bind(("history_id", history_id.to_string()))
                .bind(("category_id", data.category_id.to_string()))
                .bind(("format_id", data.format_id.map(|f| f.to_string())))
                .bind(("metadata", Value::Object(data.metadata)))
                .bind(("raw_data", Value::Object(data.raw_data)))
                .bind(("document_paths", data.document_paths))
                .bind(("organization_id", data.organization_id.to_string()))
                .bind(("scan_code", history.scan_code))
                .bind(("category_data_col", history.category_data_col))
                .bind(("batch_id", history.batch_id.to_string()))
                .bind(("thumbnails", history.thumbnails)),
        )
        .await?
        .check()
        .map_err(|e| DbError::Query(e.to_string()))?;

        debug!(
            tenant = %tenant,
            category_data_id = %data_id,
            scan_history_id = %history_id,
            "Scan recorded"
        );

        let (category_data, scan_history) = tokio::try_join!(
            category_data::fetch(&self.db, self.timeout, &data_table, data_id),
            self.fetch(&history_table, history_id),
        )?;

        Ok(RecordedScan {
            category_data,
            scan_history,
        })
    }

    async fn get_by_id(&self, tenant: &TenantNamespace, id: Uuid) -> ExtoResult<ScanHistory> {
        require_tenant(tenant)?;
        Ok(self.fetch(&tenant.scan_histories(), id).await?)
    }

    async fn list(
        &self,
        tenant: &TenantNamespace,
        pagination: Pagination,
    ) -> ExtoResult<PaginatedResult<ScanHistory>> {
        require_tenant(tenant)?;
        let table = tenant.scan_histories();
        let (items, total) =
            tokio::try_join!(self.page(&table, pagination), self.count_in(&table))?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn count(&self, tenant: &TenantNamespace) -> ExtoResult<u64> {
        require_tenant(tenant)?;
        Ok(self.count_in(&tenant.scan_histories()).await?)
    }
}
