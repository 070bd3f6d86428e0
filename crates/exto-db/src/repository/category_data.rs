//! SurrealDB implementation of [`CategoryDataRepository`].
//!
//! Records are created by the scan write (see
//! [`super::SurrealScanHistoryRepository`]); this repository reads them
//! and patches their metadata.

use std::time::Duration;

use chrono::{DateTime, Utc};
use exto_core::error::ExtoResult;
use exto_core::models::category_data::CategoryData;
use exto_core::repository::{CategoryDataRepository, PaginatedResult, Pagination};
use exto_core::tenant::TenantNamespace;
use serde_json::{Map, Value};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::query::{
    CountRow, DEFAULT_QUERY_TIMEOUT, parse_opt_uuid, parse_uuid, rows_or_empty, timed,
};
use crate::tenant::require_tenant;

#[derive(Debug, SurrealValue)]
struct CategoryDataRowWithId {
    record_id: String,
    category_id: String,
    format_id: Option<String>,
    metadata: Value,
    raw_data: Value,
    document_paths: Vec<String>,
    organization_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn into_map(field: &str, value: Value) -> Result<Map<String, Value>, DbError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(DbError::Decode(format!(
            "{field} must be an object, got {other}"
        ))),
    }
}

impl CategoryDataRowWithId {
    fn try_into_category_data(self) -> Result<CategoryData, DbError> {
        Ok(CategoryData {
            id: parse_uuid("category data", &self.record_id)?,
            category_id: parse_uuid("category", &self.category_id)?,
            format_id: parse_opt_uuid("format", self.format_id)?,
            metadata: into_map("metadata", self.metadata)?,
            raw_data: into_map("raw_data", self.raw_data)?,
            document_paths: self.document_paths,
            organization_id: parse_uuid("organization", &self.organization_id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Reads one record from a category-data table.
pub(super) async fn fetch<C: Connection>(
    db: &Surreal<C>,
    limit: Duration,
    table: &str,
    id: Uuid,
) -> Result<CategoryData, DbError> {
    let id_str = id.to_string();
    let mut result = timed(
        limit,
        db.query(
            "SELECT meta::id(id) AS record_id, * \
             FROM type::record($tb, $id)",
        )
        .bind(("tb", table.to_string()))
        .bind(("id", id_str.clone())),
    )
    .await?;
    let rows: Vec<CategoryDataRowWithId> = rows_or_empty(result.take(0))?;
    rows.into_iter()
        .next()
        .ok_or(DbError::NotFound {
            entity: "category_data".into(),
            id: id_str,
        })?
        .try_into_category_data()
}

/// SurrealDB implementation of the CategoryData repository.
#[derive(Clone)]
pub struct SurrealCategoryDataRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealCategoryDataRepository<C> {
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

    async fn page(&self, table: &str, pagination: Pagination) -> Result<Vec<CategoryData>, DbError> {
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
        let rows: Vec<CategoryDataRowWithId> = rows_or_empty(result.take(0))?;
        rows.into_iter()
            .map(|r| r.try_into_category_data())
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

impl<C: Connection> CategoryDataRepository for SurrealCategoryDataRepository<C> {
    async fn get_by_id(
        &self,
        tenant: &TenantNamespace,
        category_slug: &str,
        id: Uuid,
    ) -> ExtoResult<CategoryData> {
        require_tenant(tenant)?;
        Ok(fetch(&self.db, self.timeout, &tenant.category_data(category_slug), id).await?)
    }

    async fn list(
        &self,
        tenant: &TenantNamespace,
        category_slug: &str,
        pagination: Pagination,
    ) -> ExtoResult<PaginatedResult<CategoryData>> {
        require_tenant(tenant)?;
        let table = tenant.category_data(category_slug);
        let (items, total) =
            tokio::try_join!(self.page(&table, pagination), self.count_in(&table))?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn update_metadata(
        &self,
        tenant: &TenantNamespace,
        category_slug: &str,
        id: Uuid,
        metadata: Map<String, Value>,
    ) -> ExtoResult<CategoryData> {
        require_tenant(tenant)?;
        let table = tenant.category_data(category_slug);
        fetch(&self.db, self.timeout, &table, id).await?;

        let result = timed(
            self.timeout,
            self.db
                .query(
                    "UPDATE type::record($tb, $id) SET \
                     metadata = $metadata, updated_at = time::now()",
                )
                .bind(("tb", table.clone()))
                .bind(("id", id.to_string()))
                .bind(("metadata", Value::Object(metadata))),
        )
        .await?;
        result.check().map_err(|e| DbError::Query(e.to_string()))?;

        Ok(fetch(&self.db, self.timeout, &table, id).await?)
    }
}
