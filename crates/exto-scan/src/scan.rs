//! Scan orchestration: upload, extraction, persistence and audit.
//!
//! Every scan walks `Uploaded -> Extracted -> Persisted -> Audited`, then
//! hands a usage event to the meter. Any failure before `Audited` aborts
//! the scan; nothing is retried. The category-data record and its
//! scan-history entry are written in one transaction, so `Persisted` and
//! `Audited` are reached together.

use std::fmt;
use std::sync::Arc;

use exto_core::context::RequestContext;
use exto_core::error::{ExtoError, ExtoResult};
use exto_core::models::category_data::CreateCategoryData;
use exto_core::models::scan_history::CreateScanHistory;
use exto_core::repository::{
    BatchRepository, CategoryRepository, FormatRepository, OrganizationRepository,
    ScanHistoryRepository, TenantRepository,
};
use exto_extract::model::CompletionModel;
use exto_extract::prompt;
use exto_extract::service::ExtractionService;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::categories::CategoryRegistry;
use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::files::UniquePathAllocator;
use crate::imaging;
use crate::metering::{SCAN_EVENT, UsageRecorder};
use crate::organizations::OrganizationService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStage {
    Uploaded,
    Extracted,
    Persisted,
    Audited,
    Metered,
}

impl ScanStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStage::Uploaded => "uploaded",
            ScanStage::Extracted => "extracted",
            ScanStage::Persisted => "persisted",
            ScanStage::Audited => "audited",
            ScanStage::Metered => "metered",
        }
    }
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded document to process.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub batch_id: Uuid,
    pub category_id: Uuid,
    /// Restricts the template to one format of the category.
    pub format_id: Option<Uuid>,
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub batch_id: Uuid,
    pub category_data_id: Uuid,
    pub scan_history_id: Uuid,
    pub scan_code: String,
    pub raw_data: Map<String, Value>,
}

pub struct ScanOrchestrator<M, C, F, O, S, T, B, U>
where
    M: CompletionModel,
    C: CategoryRepository,
    F: FormatRepository,
    O: OrganizationRepository,
    S: ScanHistoryRepository,
    T: TenantRepository,
    B: BatchRepository,
    U: UsageRecorder,
{
    extraction: Arc<ExtractionService<M>>,
    registry: Arc<CategoryRegistry<C, F>>,
    organizations: Arc<OrganizationService<O, S, T>>,
    histories: S,
    batches: B,
    meter: U,
    paths: UniquePathAllocator,
    config: ScanConfig,
}

impl<M, C, F, O, S, T, B, U> ScanOrchestrator<M, C, F, O, S, T, B, U>
where
    M: CompletionModel,
    C: CategoryRepository,
    F: FormatRepository,
    O: OrganizationRepository,
    S: ScanHistoryRepository,
    T: TenantRepository,
    B: BatchRepository,
    U: UsageRecorder,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        extraction: Arc<ExtractionService<M>>,
        registry: Arc<CategoryRegistry<C, F>>,
        organizations: Arc<OrganizationService<O, S, T>>,
        histories: S,
        batches: B,
        meter: U,
        paths: UniquePathAllocator,
        config: ScanConfig,
    ) -> Self {
        Self {
            extraction,
            registry,
            organizations,
            histories,
            batches,
            meter,
            paths,
            config,
        }
    }

    #[instrument(
        skip_all,
        fields(
            org_id = %ctx.org.id,
            category_id = %request.category_id,
            batch_id = %request.batch_id,
        )
    )]
    pub async fn scan(&self, ctx: &RequestContext, request: ScanRequest) -> ExtoResult<ScanResult> {
        let tenant = ctx.tenant()?;
        if request.bytes.is_empty() {
            return Err(ExtoError::validation("uploaded file is empty"));
        }

        if let Err(e) = self.organizations.touch_last_active(ctx.org.id).await {
            warn!(error = %e, "Failed to record organization activity");
        }

        // Inputs are checked before anything is written.
        let batch = self.batches.get_by_id(&tenant, request.batch_id).await?;
        if !batch.is_open() {
            return Err(ExtoError::validation(format!(
                "batch {} is closed",
                batch.id
            )));
        }
        let category = self.registry.get_by_id(request.category_id).await?;
        let mut formats = self.registry.formats(category.id).await?;
        if let Some(format_id) = request.format_id {
            formats.retain(|f| f.id == format_id);
            if formats.is_empty() {
                return Err(ExtoError::not_found("format", format_id));
            }
        }
        let fields = prompt::template_fields(&formats);
        let image = imaging::jpeg_data_url(&request.bytes, self.config.upload_quality)?;
        let thumbnail = imaging::thumbnail_data_url(
            &request.bytes,
            self.config.thumbnail_size,
            self.config.thumbnail_quality,
        )?;

        let path = self
            .paths
            .allocate(&self.config.upload_dir, ctx.org.id, &request.filename)
            .await?
            .ok_or_else(|| ScanError::PathExhausted(request.filename.clone()))?;
        tokio::fs::write(&path, &request.bytes)
            .await
            .map_err(ScanError::from)?;
        let document_path = path.to_string_lossy().into_owned();
        info!(stage = %ScanStage::Uploaded, path = %document_path, "Scan stage reached");

        let outcome = self.extraction.extract(&fields, &image).await?;
        info!(
            stage = %ScanStage::Extracted,
            keys = outcome.values.len(),
            average_confidence = outcome.average_confidence,
            "Scan stage reached"
        );

        let primary = category
            .primary_field
            .as_deref()
            .and_then(|field| outcome.string_value(field));
        let scan_code = match primary {
            Some(code) => code.to_string(),
            None => self.organizations.next_scan_code(ctx.org.id).await?,
        };

        let raw_data = outcome.raw_data();

        let recorded = self
            .histories
            .record(
                &tenant,
                CreateCategoryData {
                    category_id: category.id,
                    format_id: request.format_id,
                    metadata: outcome.values,
                    raw_data: raw_data.clone(),
                    document_paths: vec![document_path],
                    organization_id: ctx.org.id,
                },
                CreateScanHistory {
                    category_id: category.id,
                    format_id: request.format_id,
                    scan_code: scan_code.clone(),
                    category_data_col: category.data_collection(),
                    batch_id: batch.id,
                    thumbnails: vec![thumbnail],
                },
            )
            .await?;
        info!(
            stage = %ScanStage::Persisted,
            collection = %recorded.scan_history.category_data_col,
            "Scan stage reached"
        );
        info!(
            stage = %ScanStage::Audited,
            scan_code = %scan_code,
            category_data_id = %recorded.category_data.id,
            scan_history_id = %recorded.scan_history.id,
            "Scan stage reached"
        );

        // Detached; a metering failure never fails the scan.
        self.meter.record_detached(ctx, SCAN_EVENT, 1);
        info!(stage = %ScanStage::Metered, "Usage event dispatched");

        Ok(ScanResult {
            batch_id: batch.id,
            category_data_id: recorded.category_data.id,
            scan_history_id: recorded.scan_history.id,
            scan_code,
            raw_data,
        })
    }
}
