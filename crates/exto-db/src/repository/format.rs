//! SurrealDB implementation of [`FormatRepository`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use exto_core::error::ExtoResult;
use exto_core::models::format::{CreateFormat, ExtractionField, Format};
use exto_core::repository::FormatRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::query::{DEFAULT_QUERY_TIMEOUT, parse_uuid, timed};

#[derive(Debug, SurrealValue)]
struct FormatRow {
    name: String,
    category_id: String,
    is_active: bool,
    extraction_fields: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct FormatRowWithId {
    record_id: String,
    name: String,
    category_id: String,
    is_active: bool,
    extraction_fields: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn decode_extraction_fields(raw: serde_json::Value) -> Result<Vec<ExtractionField>, DbError> {
    if raw.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(raw)
        .map_err(|e| DbError::Decode(format!("invalid extraction fields: {e}")))
}

impl FormatRow {
    fn into_format(self, id: Uuid) -> Result<Format, DbError> {
        Ok(Format {
            id,
            name: self.name,
            category_id: parse_uuid("category", &self.category_id)?,
            is_active: self.is_active,
            extraction_fields: decode_extraction_fields(self.extraction_fields)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl FormatRowWithId {
    fn try_into_format(self) -> Result<Format, DbError> {
        let id = parse_uuid("format", &self.record_id)?;
        FormatRow {
            name: self.name,
            category_id: self.category_id,
            is_active: self.is_active,
            extraction_fields: self.extraction_fields,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_format(id)
    }
}

/// SurrealDB implementation of the Format repository.
#[derive(Clone)]
pub struct SurrealFormatRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealFormatRepository<C> {
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
}

impl<C: Connection> FormatRepository for SurrealFormatRepository<C> {
    async fn create(&self, input: CreateFormat) -> ExtoResult<Format> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let fields = serde_json::to_value(&input.extraction_fields)
            .map_err(|e| DbError::Decode(format!("invalid extraction fields: {e}")))?;

        let result = timed(
            self.timeout,
            self.db
                .query(
                    "CREATE type::record('format', $id) SET \
                     name = $name, category_id = $category_id, \
                     extraction_fields = $extraction_fields",
                )
                .bind(("id", id_str.clone()))
                .bind(("name", input.name))
                .bind(("category_id", input.category_id.to_string()))
                .bind(("extraction_fields", fields)),
        )
        .await?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<FormatRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "format".into(),
            id: id_str,
        })?;

        Ok(row.into_format(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> ExtoResult<Format> {
        let id_str = id.to_string();
        let mut result = timed(
            self.timeout,
            self.db
                .query("SELECT * FROM type::record('format', $id)")
                .bind(("id", id_str.clone())),
        )
        .await?;

        let rows: Vec<FormatRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "format".into(),
            id: id_str,
        })?;

        Ok(row.into_format(id)?)
    }

    async fn list_by_category(&self, category_id: Uuid) -> ExtoResult<Vec<Format>> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM format \
                     WHERE category_id = $category_id \
                     ORDER BY created_at ASC",
                )
                .bind(("category_id", category_id.to_string())),
        )
        .await?;

        let rows: Vec<FormatRowWithId> = result.take(0).map_err(DbError::from)?;
        let formats = rows
            .into_iter()
            .map(|r| r.try_into_format())
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(formats)
    }
}
