//! Batch lifecycle within the caller's organization.

use exto_core::context::RequestContext;
use exto_core::error::{ExtoError, ExtoResult};
use exto_core::models::batch::{Batch, BatchStatus, CreateBatch};
use exto_core::repository::{BatchRepository, PaginatedResult, Pagination};
use tracing::{info, instrument};
use uuid::Uuid;

pub struct BatchService<B: BatchRepository> {
    batches: B,
}

impl<B: BatchRepository> BatchService<B> {
    pub fn new(batches: B) -> Self {
        Self { batches }
    }

    #[instrument(skip(self, ctx), fields(org_id = %ctx.org.id))]
    pub async fn create(&self, ctx: &RequestContext, name: &str) -> ExtoResult<Batch> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ExtoError::validation("batch name must not be empty"));
        }
        let batch = self
            .batches
            .create(
                &ctx.tenant()?,
                CreateBatch {
                    name: name.to_string(),
                },
            )
            .await?;
        info!(batch_id = %batch.id, "Batch opened");
        Ok(batch)
    }

    pub async fn get(&self, ctx: &RequestContext, id: Uuid) -> ExtoResult<Batch> {
        self.batches.get_by_id(&ctx.tenant()?, id).await
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        pagination: Pagination,
    ) -> ExtoResult<PaginatedResult<Batch>> {
        self.batches.list(&ctx.tenant()?, pagination).await
    }

    /// Closes an open batch. Closing twice is a validation error.
    #[instrument(skip(self, ctx), fields(org_id = %ctx.org.id))]
    pub async fn close(&self, ctx: &RequestContext, id: Uuid) -> ExtoResult<Batch> {
        let tenant = ctx.tenant()?;
        let closed = self
            .batches
            .transition(&tenant, id, BatchStatus::Open, BatchStatus::Closed)
            .await?;
        match closed {
            Some(batch) => {
                info!(batch_id = %id, "Batch closed");
                Ok(batch)
            }
            // Lost to another close, or never existed.
            None => {
                let current = self.batches.get_by_id(&tenant, id).await?;
                current.close()?;
                Err(ExtoError::validation(format!("batch {id} is not open")))
            }
        }
    }
}
