//! SurrealDB implementation of [`CategoryRepository`].
//!
//! `fields` is stored as the JSON tree the registry receives; it is decoded
//! back into [`Field`] on read.

use std::time::Duration;

use chrono::{DateTime, Utc};
use exto_core::error::ExtoResult;
use exto_core::models::category::{Category, CreateCategory, Field};
use exto_core::repository::{CategoryRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::query::{CountRow, DEFAULT_QUERY_TIMEOUT, parse_uuid, timed};

#[derive(Debug, SurrealValue)]
struct CategoryRow {
    name: String,
    slug: String,
    version: String,
    primary_field: Option<String>,
    fields: serde_json::Value,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct CategoryRowWithId {
    record_id: String,
    name: String,
    slug: String,
    version: String,
    primary_field: Option<String>,
    fields: serde_json::Value,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn decode_fields(raw: serde_json::Value) -> Result<Vec<Field>, DbError> {
    if raw.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(raw).map_err(|e| DbError::Decode(format!("invalid category fields: {e}")))
}

impl CategoryRow {
    fn into_category(self, id: Uuid) -> Result<Category, DbError> {
        Ok(Category {
            id,
            name: self.name,
            slug: self.slug,
            version: self.version,
            primary_field: self.primary_field,
            fields: decode_fields(self.fields)?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl CategoryRowWithId {
    fn try_into_category(self) -> Result<Category, DbError> {
        Ok(Category {
            id: parse_uuid("category", &self.record_id)?,
            name: self.name,
            slug: self.slug,
            version: self.version,
            primary_field: self.primary_field,
            fields: decode_fields(self.fields)?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn not_found(id: impl ToString) -> DbError {
    DbError::NotFound {
        entity: "category".into(),
        id: id.to_string(),
    }
}

/// SurrealDB implementation of the Category repository.
#[derive(Clone)]
pub struct SurrealCategoryRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealCategoryRepository<C> {
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

    async fn count_all(&self) -> Result<u64, DbError> {
        let mut result = timed(
            self.timeout,
            self.db
                .query("SELECT count() AS total FROM category GROUP ALL"),
        )
        .await?;
        let rows: Vec<CountRow> = result.take(0)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn page(&self, pagination: Pagination) -> Result<Vec<Category>, DbError> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM category \
                     ORDER BY created_at DESC \
                     LIMIT $limit START $offset",
                )
                .bind(("limit", pagination.limit))
                .bind(("offset", pagination.offset)),
        )
        .await?;
        let rows: Vec<CategoryRowWithId> = result.take(0)?;
        rows.into_iter().map(|r| r.try_into_category()).collect()
    }
}

impl<C: Connection> CategoryRepository for SurrealCategoryRepository<C> {
    async fn create(&self, input: CreateCategory) -> ExtoResult<Category> {
        input.validate()?;

        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let fields = serde_json::to_value(&input.fields)
            .map_err(|e| DbError::Decode(format!("invalid category fields: {e}")))?;

        let result = timed(
            self.timeout,
            self.db
                .query(
                    "CREATE type::record('category', $id) SET \
                     name = $name, slug = $slug, version = $version, \
                     primary_field = $primary_field, fields = $fields",
                )
                .bind(("id", id_str.clone()))
                .bind(("name", input.name))
                .bind(("slug", input.slug))
                .bind(("version", input.version))
                .bind(("primary_field", input.primary_field))
                .bind(("fields", fields)),
        )
        .await?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<CategoryRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_category(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> ExtoResult<Category> {
        let id_str = id.to_string();
        let mut result = timed(
            self.timeout,
            self.db
                .query("SELECT * FROM type::record('category', $id)")
                .bind(("id", id_str.clone())),
        )
        .await?;

        let rows: Vec<CategoryRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_category(id)?)
    }

    async fn count(&self) -> ExtoResult<u64> {
        Ok(self.count_all().await?)
    }

    async fn list(&self, pagination: Pagination) -> ExtoResult<PaginatedResult<Category>> {
        let (items, total) = tokio::try_join!(self.page(pagination), self.count_all())?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
