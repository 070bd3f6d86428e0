//! Service wiring over one SurrealDB connection.

use std::sync::Arc;
use std::time::Duration;

use exto_db::SurrealTenantRepository;
use exto_db::repository::{
    SurrealBatchRepository, SurrealCategoryDataRepository, SurrealCategoryRepository,
    SurrealFormatRepository, SurrealIdentityRepository, SurrealMeterEventRepository,
    SurrealOrganizationRepository, SurrealRegistrationRepository, SurrealScanHistoryRepository,
    SurrealSubscriptionRepository, SurrealUserRepository,
};
use exto_extract::{DocumentAnalyzer, ExtractionService, OpenAiClient};
use exto_scan::{
    AccountService, BatchService, BoundedTtlCache, CategoryDataService, CategoryRegistry,
    ExportService, MeterService, OrganizationService, PaymentService, ScanOrchestrator,
    StripeClient, UniquePathAllocator,
};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;
use tracing::warn;

use crate::config::ServerConfig;

type Orgs = SurrealOrganizationRepository<Client>;
type Histories = SurrealScanHistoryRepository<Client>;
type Tenants = SurrealTenantRepository<Client>;
type Categories = SurrealCategoryRepository<Client>;
type Formats = SurrealFormatRepository<Client>;
type Records = SurrealCategoryDataRepository<Client>;

pub type Organizations = OrganizationService<Orgs, Histories, Tenants>;
pub type Registry = CategoryRegistry<Categories, Formats>;
pub type Accounts = AccountService<
    SurrealRegistrationRepository<Client>,
    SurrealIdentityRepository<Client>,
    SurrealUserRepository<Client>,
    Orgs,
    Histories,
    Tenants,
>;
pub type Meter = MeterService<Orgs, SurrealMeterEventRepository<Client>, Option<StripeClient>>;
pub type Payments = PaymentService<Orgs, SurrealSubscriptionRepository<Client>, Option<StripeClient>>;
pub type Scanner = ScanOrchestrator<
    Arc<OpenAiClient>,
    Categories,
    Formats,
    Orgs,
    Histories,
    Tenants,
    SurrealBatchRepository<Client>,
    Meter,
>;

pub struct AppState {
    pub accounts: Accounts,
    pub organizations: Arc<Organizations>,
    pub categories: Arc<Registry>,
    pub batches: BatchService<SurrealBatchRepository<Client>>,
    pub records: CategoryDataService<Categories, Formats, Records, Histories>,
    pub exports: ExportService<Categories, Formats, Records, Histories>,
    pub payments: Payments,
    pub meter: Meter,
    /// Absent when no extraction model is configured.
    pub scanner: Option<Scanner>,
    pub analyzer: Option<DocumentAnalyzer<Arc<OpenAiClient>>>,
}

impl AppState {
    pub fn build(config: &ServerConfig, db: &Surreal<Client>, timeout: Duration) -> Self {
        let orgs = SurrealOrganizationRepository::new(db.clone()).with_timeout(timeout);
        let histories = SurrealScanHistoryRepository::new(db.clone()).with_timeout(timeout);
        let tenants = SurrealTenantRepository::new(db.clone()).with_timeout(timeout);
        let records = SurrealCategoryDataRepository::new(db.clone()).with_timeout(timeout);
        let batches = SurrealBatchRepository::new(db.clone()).with_timeout(timeout);
        let scan = &config.scan;

        let organizations = Arc::new(OrganizationService::new(
            orgs.clone(),
            histories.clone(),
            tenants.clone(),
            BoundedTtlCache::new(scan.last_active_capacity, scan.last_active_threshold),
            scan.last_active_threshold,
        ));
        let categories = Arc::new(CategoryRegistry::new(
            SurrealCategoryRepository::new(db.clone()).with_timeout(timeout),
            SurrealFormatRepository::new(db.clone()).with_timeout(timeout),
            BoundedTtlCache::new(scan.category_cache_capacity, scan.category_cache_ttl),
        ));

        let stripe = match StripeClient::new(config.payment.clone()) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "Payment provider disabled");
                None
            }
        };
        let meter = MeterService::new(
            orgs.clone(),
            SurrealMeterEventRepository::new(db.clone()).with_timeout(timeout),
            stripe.clone(),
        );
        let payments = PaymentService::new(
            orgs.clone(),
            SurrealSubscriptionRepository::new(db.clone()).with_timeout(timeout),
            stripe,
            &config.payment,
        );

        let model = match OpenAiClient::new(&config.extraction) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "Extraction disabled");
                None
            }
        };
        let scanner = model.as_ref().map(|model| {
            ScanOrchestrator::new(
                Arc::new(ExtractionService::new(
                    Arc::clone(model),
                    config.extraction.clone(),
                )),
                Arc::clone(&categories),
                Arc::clone(&organizations),
                histories.clone(),
                batches.clone(),
                meter.clone(),
                UniquePathAllocator::from_config(scan),
                scan.clone(),
            )
        });
        let analyzer = model.map(|model| DocumentAnalyzer::new(model, config.extraction.clone()));

        Self {
            accounts: AccountService::new(
                SurrealRegistrationRepository::new(db.clone()).with_timeout(timeout),
                SurrealIdentityRepository::new(db.clone()).with_timeout(timeout),
                SurrealUserRepository::new(db.clone()).with_timeout(timeout),
                orgs,
                Arc::clone(&organizations),
                tenants,
            ),
            batches: BatchService::new(batches),
            records: CategoryDataService::new(
                Arc::clone(&categories),
                records.clone(),
                histories.clone(),
            ),
            exports: ExportService::new(
                Arc::clone(&categories),
                records,
                histories,
                scan.export_dir.clone(),
            ),
            organizations,
            categories,
            payments,
            meter,
            scanner,
            analyzer,
        }
    }
}
