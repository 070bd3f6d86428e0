//! Read and edit access to extracted records and scan history.

use std::sync::Arc;

use exto_core::context::RequestContext;
use exto_core::error::ExtoResult;
use exto_core::models::category_data::CategoryData;
use exto_core::models::scan_history::ScanHistory;
use exto_core::repository::{
    CategoryDataRepository, CategoryRepository, FormatRepository, PaginatedResult, Pagination,
    ScanHistoryRepository,
};
use serde_json::{Map, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::categories::CategoryRegistry;

pub struct CategoryDataService<C, F, D, S>
where
    C: CategoryRepository,
    F: FormatRepository,
    D: CategoryDataRepository,
    S: ScanHistoryRepository,
{
    registry: Arc<CategoryRegistry<C, F>>,
    records: D,
    histories: S,
}

impl<C, F, D, S> CategoryDataService<C, F, D, S>
where
    C: CategoryRepository,
    F: FormatRepository,
    D: CategoryDataRepository,
    S: ScanHistoryRepository,
{
    pub fn new(registry: Arc<CategoryRegistry<C, F>>, records: D, histories: S) -> Self {
        Self {
            registry,
            records,
            histories,
        }
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        category_id: Uuid,
        id: Uuid,
    ) -> ExtoResult<CategoryData> {
        let category = self.registry.get_by_id(category_id).await?;
        self.records
            .get_by_id(&ctx.tenant()?, &category.slug, id)
            .await
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        category_id: Uuid,
        pagination: Pagination,
    ) -> ExtoResult<PaginatedResult<CategoryData>> {
        let category = self.registry.get_by_id(category_id).await?;
        self.records
            .list(&ctx.tenant()?, &category.slug, pagination)
            .await
    }

    /// Merges `patch` into the record's metadata; keys present in the
    /// patch replace existing values, a `null` value removes the key.
    #[instrument(skip(self, ctx, patch), fields(org_id = %ctx.org.id))]
    pub async fn patch_metadata(
        &self,
        ctx: &RequestContext,
        category_id: Uuid,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> ExtoResult<CategoryData> {
        let tenant = ctx.tenant()?;
        let category = self.registry.get_by_id(category_id).await?;
        let record = self.records.get_by_id(&tenant, &category.slug, id).await?;

        let mut metadata = record.metadata;
        for (key, value) in patch {
            if value.is_null() {
                metadata.remove(&key);
            } else {
                metadata.insert(key, value);
            }
        }

        let updated = self
            .records
            .update_metadata(&tenant, &category.slug, id, metadata)
            .await?;
        info!(category_data_id = %id, "Record metadata updated");
        Ok(updated)
    }

    pub async fn history(&self, ctx: &RequestContext, id: Uuid) -> ExtoResult<ScanHistory> {
        self.histories.get_by_id(&ctx.tenant()?, id).await
    }

    /// Newest first.
    pub async fn histories(
        &self,
        ctx: &RequestContext,
        pagination: Pagination,
    ) -> ExtoResult<PaginatedResult<ScanHistory>> {
        self.histories.list(&ctx.tenant()?, pagination).await
    }
}
