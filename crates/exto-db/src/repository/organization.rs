//! SurrealDB implementation of [`OrganizationRepository`].
//!
//! The scan counter is advanced with a single `UPDATE ... SET
//! scan_counter += 1`, so concurrent scans of one organization never see
//! the same value. When the storage engine aborts the statement because of
//! a write conflict it is retried with a linear backoff.

use std::time::Duration;

use chrono::{DateTime, Utc};
use exto_core::error::ExtoResult;
use exto_core::models::organization::{
    Billing, CreateOrganization, Organization, UpdateOrganization,
};
use exto_core::repository::{OrganizationRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::warn;
use uuid::Uuid;

use crate::error::DbError;
use crate::query::{CountRow, DEFAULT_QUERY_TIMEOUT, parse_opt_uuid, parse_uuid, timed};

/// Attempts made before a conflicting counter update is reported.
const COUNTER_MAX_ATTEMPTS: u32 = 10;

/// Backoff step between counter attempts (multiplied by the attempt).
const COUNTER_BACKOFF: Duration = Duration::from_millis(5);

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct OrganizationRow {
    name: String,
    slug: String,
    owner_id: Option<String>,
    is_active: bool,
    scan_counter: u64,
    last_active_at: Option<DateTime<Utc>>,
    billing: serde_json::Value,
    payment_customer_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct OrganizationRowWithId {
    record_id: String,
    name: String,
    slug: String,
    owner_id: Option<String>,
    is_active: bool,
    scan_counter: u64,
    last_active_at: Option<DateTime<Utc>>,
    billing: serde_json::Value,
    payment_customer_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, SurrealValue)]
struct CounterRow {
    scan_counter: u64,
}

fn parse_billing(raw: serde_json::Value) -> Result<Billing, DbError> {
    if raw.as_object().is_some_and(|o| o.is_empty()) {
        return Ok(Billing::default());
    }
    serde_json::from_value(raw).map_err(|e| DbError::Decode(format!("invalid billing: {e}")))
}

impl OrganizationRow {
    fn into_organization(self, id: Uuid) -> Result<Organization, DbError> {
        Ok(Organization {
            id,
            name: self.name,
            slug: self.slug,
            owner_id: parse_opt_uuid("owner", self.owner_id)?,
            is_active: self.is_active,
            scan_counter: self.scan_counter,
            last_active_at: self.last_active_at,
            billing: parse_billing(self.billing)?,
            payment_customer_id: self.payment_customer_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

impl OrganizationRowWithId {
    fn try_into_organization(self) -> Result<Organization, DbError> {
        let id = parse_uuid("organization", &self.record_id)?;
        OrganizationRow {
            name: self.name,
            slug: self.slug,
            owner_id: self.owner_id,
            is_active: self.is_active,
            scan_counter: self.scan_counter,
            last_active_at: self.last_active_at,
            billing: self.billing,
            payment_customer_id: self.payment_customer_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        }
        .into_organization(id)
    }
}

fn not_found(id: impl ToString) -> DbError {
    DbError::NotFound {
        entity: "organization".into(),
        id: id.to_string(),
    }
}

/// SurrealDB implementation of the Organization repository.
#[derive(Clone)]
pub struct SurrealOrganizationRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealOrganizationRepository<C> {
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

    async fn try_increment(&self, id_str: &str) -> Result<Option<u64>, DbError> {
        let result = timed(
            self.timeout,
            self.db
                .query(
                    "UPDATE type::record('organization', $id) \
                     SET scan_counter += 1, updated_at = time::now() \
                     RETURN AFTER",
                )
                .bind(("id", id_str.to_string())),
        )
        .await?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<CounterRow> = result.take(0)?;
        Ok(rows.first().map(|r| r.scan_counter))
    }

    async fn count_all(&self) -> Result<u64, DbError> {
        let mut result = timed(
            self.timeout,
            self.db
                .query("SELECT count() AS total FROM organization GROUP ALL"),
        )
        .await?;
        let rows: Vec<CountRow> = result.take(0)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    async fn page(&self, pagination: Pagination) -> Result<Vec<Organization>, DbError> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * \
                     FROM organization \
                     ORDER BY created_at DESC \
                     LIMIT $limit START $offset",
                )
                .bind(("limit", pagination.limit))
                .bind(("offset", pagination.offset)),
        )
        .await?;
        let rows: Vec<OrganizationRowWithId> = result.take(0)?;
        rows.into_iter()
            .map(|row| row.try_into_organization())
            .collect()
    }
}

impl<C: Connection> OrganizationRepository for SurrealOrganizationRepository<C> {
    async fn create(&self, input: CreateOrganization) -> ExtoResult<Organization> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = timed(
            self.timeout,
            self.db
                .query(
                    "CREATE type::record('organization', $id) SET \
                     name = $name, slug = $slug, owner_id = $owner_id",
                )
                .bind(("id", id_str.clone()))
                .bind(("name", input.name))
                .bind(("slug", input.slug))
                .bind(("owner_id", input.owner_id.map(|o| o.to_string()))),
        )
        .await?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_organization(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> ExtoResult<Organization> {
        let id_str = id.to_string();

        let mut result = timed(
            self.timeout,
            self.db
                .query("SELECT * FROM type::record('organization', $id)")
                .bind(("id", id_str.clone())),
        )
        .await?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_organization(id)?)
    }

    async fn get_by_slug(&self, slug: &str) -> ExtoResult<Organization> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * \
                     FROM organization WHERE slug = $slug",
                )
                .bind(("slug", slug.to_string())),
        )
        .await?;

        let rows: Vec<OrganizationRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("slug={slug}")))?;

        Ok(row.try_into_organization()?)
    }

    async fn update(&self, id: Uuid, input: UpdateOrganization) -> ExtoResult<Organization> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.owner_id.is_some() {
            sets.push("owner_id = $owner_id");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        if input.billing.is_some() {
            sets.push("billing = $billing");
        }
        if input.payment_customer_id.is_some() {
            sets.push("payment_customer_id = $payment_customer_id");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('organization', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));

        if let Some(name) = input.name {
            builder = builder.bind(("name", name));
        }
        if let Some(owner_id) = input.owner_id {
            builder = builder.bind(("owner_id", owner_id.to_string()));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }
        if let Some(billing) = input.billing {
            let billing = serde_json::to_value(billing)
                .map_err(|e| DbError::Decode(format!("invalid billing: {e}")))?;
            builder = builder.bind(("billing", billing));
        }
        if let Some(customer) = input.payment_customer_id {
            builder = builder.bind(("payment_customer_id", customer));
        }

        let result = timed(self.timeout, builder).await?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_organization(id)?)
    }

    async fn count(&self) -> ExtoResult<u64> {
        Ok(self.count_all().await?)
    }

    async fn list(&self, pagination: Pagination) -> ExtoResult<PaginatedResult<Organization>> {
        let (items, total) = tokio::try_join!(self.page(pagination), self.count_all())?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> ExtoResult<Vec<Organization>> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * \
                     FROM organization \
                     WHERE owner_id = $owner_id AND deleted_at = NONE \
                     ORDER BY created_at ASC",
                )
                .bind(("owner_id", owner_id.to_string())),
        )
        .await?;

        let rows: Vec<OrganizationRowWithId> = result.take(0).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_organization())
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(items)
    }

    async fn increment_scan_counter(&self, id: Uuid) -> ExtoResult<u64> {
        let id_str = id.to_string();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_increment(&id_str).await {
                Ok(Some(counter)) => return Ok(counter),
                Ok(None) => return Err(not_found(&id_str).into()),
                Err(e) if e.is_retryable() && attempt < COUNTER_MAX_ATTEMPTS => {
                    warn!(
                        organization_id = %id,
                        attempt,
                        error = %e,
                        "Scan counter update conflicted, retrying"
                    );
                    tokio::time::sleep(COUNTER_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn set_last_active(&self, id: Uuid, at: DateTime<Utc>) -> ExtoResult<()> {
        let id_str = id.to_string();
        let result = timed(
            self.timeout,
            self.db
                .query(
                    "UPDATE type::record('organization', $id) \
                     SET last_active_at = $at",
                )
                .bind(("id", id_str.clone()))
                .bind(("at", at)),
        )
        .await?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<OrganizationRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(not_found(&id_str).into());
        }
        Ok(())
    }

    async fn mark_deleted(&self, id: Uuid, deleted_by: Option<Uuid>) -> ExtoResult<()> {
        let result = timed(
            self.timeout,
            self.db
                .query(
                    "UPDATE type::record('organization', $id) SET \
                     deleted_at = time::now(), deleted_by = $deleted_by, \
                     is_active = false, updated_at = time::now()",
                )
                .bind(("id", id.to_string()))
                .bind(("deleted_by", deleted_by.map(|d| d.to_string()))),
        )
        .await?;
        result.check().map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }
}
