//! Per-organization table lifecycle.
//!
//! All namespaces share one SurrealDB database; a tenant collection is the
//! table `sc_<slug>__<collection>` (see [`TenantNamespace::collection`]).
//! Tables are defined lazily and idempotently, and removing a tenant
//! removes every table carrying its prefix.

use std::time::Duration;

use exto_core::error::{ExtoError, ExtoResult};
use exto_core::repository::TenantRepository;
use exto_core::tenant::{self, TenantNamespace};
use surrealdb::{Connection, Surreal};
use tracing::{info, warn};

use crate::error::DbError;
use crate::query::{DEFAULT_QUERY_TIMEOUT, timed};

/// DDL for a tenant's batch and scan-history tables.
fn tenant_ddl(tenant: &TenantNamespace) -> String {
    let batch = tenant.batches();
    let history = tenant.scan_histories();
    format!(
        "DEFINE TABLE IF NOT EXISTS `{batch}` SCHEMALESS;\n\
         DEFINE INDEX IF NOT EXISTS idx_batch_created ON TABLE `{batch}` \
             COLUMNS created_at;\n\
         DEFINE TABLE IF NOT EXISTS `{history}` SCHEMALESS;\n\
         DEFINE INDEX IF NOT EXISTS idx_scan_history_created ON TABLE `{history}` \
             COLUMNS created_at;\n\
         DEFINE INDEX IF NOT EXISTS idx_scan_history_batch ON TABLE `{history}` \
             COLUMNS batch_id;\n"
    )
}

/// DDL for a category-data table inside a tenant.
fn data_collection_ddl(table: &str) -> String {
    format!(
        "DEFINE TABLE IF NOT EXISTS `{table}` SCHEMALESS;\n\
         DEFINE INDEX IF NOT EXISTS idx_category_data_created ON TABLE `{table}` \
             COLUMNS created_at;\n"
    )
}

pub(crate) fn require_tenant(tenant: &TenantNamespace) -> Result<(), ExtoError> {
    match tenant {
        TenantNamespace::Core => Err(ExtoError::TenantContext),
        TenantNamespace::Organization(slug) => tenant::validate_slug(slug),
    }
}

fn is_collection_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

fn require_category_slug(slug: &str) -> Result<(), ExtoError> {
    if !is_collection_name(slug) {
        return Err(ExtoError::validation(format!(
            "invalid category slug: {slug:?}"
        )));
    }
    Ok(())
}

/// Defines a tenant's batch and scan-history tables.
pub(crate) async fn ensure_tenant_tables<C: Connection>(
    db: &Surreal<C>,
    limit: Duration,
    tenant: &TenantNamespace,
) -> ExtoResult<()> {
    require_tenant(tenant)?;
    timed(limit, db.query(tenant_ddl(tenant)))
        .await?
        .check()
        .map_err(|e| DbError::Query(e.to_string()))?;
    Ok(())
}

/// Defines a category's data table inside a tenant.
pub(crate) async fn ensure_category_table<C: Connection>(
    db: &Surreal<C>,
    limit: Duration,
    tenant: &TenantNamespace,
    category_slug: &str,
) -> ExtoResult<()> {
    require_category_slug(category_slug)?;
    ensure_data_collection(db, limit, tenant, &tenant::category_data_collection(category_slug))
        .await
}

/// Defines a category-data table addressed by its collection name
/// (`<category-slug>_data`).
pub(crate) async fn ensure_data_collection<C: Connection>(
    db: &Surreal<C>,
    limit: Duration,
    tenant: &TenantNamespace,
    collection: &str,
) -> ExtoResult<()> {
    require_tenant(tenant)?;
    if !is_collection_name(collection) {
        return Err(ExtoError::validation(format!(
            "invalid collection name: {collection:?}"
        )));
    }
    timed(limit, db.query(data_collection_ddl(&tenant.collection(collection))))
        .await?
        .check()
        .map_err(|e| DbError::Query(e.to_string()))?;
    Ok(())
}

/// SurrealDB implementation of the tenant lifecycle repository.
#[derive(Clone)]
pub struct SurrealTenantRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealTenantRepository<C> {
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

    /// Physical tables currently defined for `tenant`.
    pub async fn tables(&self, tenant: &TenantNamespace) -> ExtoResult<Vec<String>> {
        let Some(prefix) = tenant.table_prefix() else {
            return Err(ExtoError::TenantContext);
        };

        let mut result = timed(self.timeout, self.db.query("INFO FOR DB")).await?;
        let info: Option<serde_json::Value> = result.take(0).map_err(DbError::from)?;

        let mut tables: Vec<String> = info
            .as_ref()
            .and_then(|v| v.get("tables"))
            .and_then(|t| t.as_object())
            .map(|t| {
                t.keys()
                    .filter(|name| name.starts_with(&prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        tables.sort();
        Ok(tables)
    }
}

impl<C: Connection> TenantRepository for SurrealTenantRepository<C> {
    async fn provision(&self, tenant: &TenantNamespace) -> ExtoResult<()> {
        ensure_tenant_tables(&self.db, self.timeout, tenant).await?;
        info!(tenant = %tenant, "Tenant tables provisioned");
        Ok(())
    }

    async fn provision_category(
        &self,
        tenant: &TenantNamespace,
        category_slug: &str,
    ) -> ExtoResult<()> {
        ensure_category_table(&self.db, self.timeout, tenant, category_slug).await
    }

    async fn drop_tenant(&self, tenant: &TenantNamespace) -> ExtoResult<()> {
        require_tenant(tenant)?;
        let tables = self.tables(tenant).await?;
        if tables.is_empty() {
            warn!(tenant = %tenant, "No tables to drop for tenant");
            return Ok(());
        }

        let statements: String = tables
            .iter()
            .map(|t| format!("REMOVE TABLE IF EXISTS `{t}`;\n"))
            .collect();
        timed(self.timeout, self.db.query(statements))
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        info!(tenant = %tenant, tables = tables.len(), "Tenant tables dropped");
        Ok(())
    }
}
