//! Integration tests for accounts, metering, payments, record editing and
//! export using in-memory SurrealDB and a fake payment provider.

use std::sync::{Arc, Mutex};

use calamine::{Data, Range, Reader, Xlsx, open_workbook};
use exto_core::context::RequestContext;
use exto_core::error::{ExtoError, ExtoResult};
use exto_core::models::category::{Category, CreateCategory, Field, FieldType};
use exto_core::models::category_data::CreateCategoryData;
use exto_core::models::organization::Billing;
use exto_core::models::scan_history::CreateScanHistory;
use exto_core::models::subscription::{BillingCycle, SubscriptionStatus};
use exto_core::repository::{
    IdentityRepository, MeterEventRepository, OrganizationRepository, Pagination, RecordedScan,
    ScanHistoryRepository, UserRepository,
};
use exto_db::SurrealTenantRepository;
use exto_db::repository::{
    SurrealCategoryDataRepository, SurrealCategoryRepository, SurrealFormatRepository,
    SurrealIdentityRepository, SurrealMeterEventRepository, SurrealOrganizationRepository,
    SurrealRegistrationRepository, SurrealScanHistoryRepository, SurrealSubscriptionRepository,
    SurrealUserRepository,
};
use exto_scan::metering::{ProviderSubscription, SetupIntent, UsageRecorder};
use exto_scan::{
    AccountService, BoundedTtlCache, CategoryDataService, CategoryRegistry, ExportService,
    MeterService, OrganizationService, PaymentConfig, PaymentProvider, PaymentService,
    ScanConfig,
};
use serde_json::{Map, json};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tempfile::TempDir;
use uuid::Uuid;

type Organizations = OrganizationService<
    SurrealOrganizationRepository<Db>,
    SurrealScanHistoryRepository<Db>,
    SurrealTenantRepository<Db>,
>;
type Accounts = AccountService<
    SurrealRegistrationRepository<Db>,
    SurrealIdentityRepository<Db>,
    SurrealUserRepository<Db>,
    SurrealOrganizationRepository<Db>,
    SurrealScanHistoryRepository<Db>,
    SurrealTenantRepository<Db>,
>;
type Registry = CategoryRegistry<SurrealCategoryRepository<Db>, SurrealFormatRepository<Db>>;

/// Payment provider double that records every call.
#[derive(Clone, Default)]
struct FakeProvider {
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeProvider {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PaymentProvider for FakeProvider {
    async fn ensure_customer(&self, existing: Option<&str>, billing: &Billing) -> ExtoResult<String> {
        if let Some(id) = existing {
            return Ok(id.to_string());
        }
        self.calls
            .lock()
            .unwrap()
            .push(format!("customer:{}", billing.email));
        Ok("cus_123".into())
    }

    async fn create_setup_intent(&self, customer_id: &str) -> ExtoResult<SetupIntent> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("setup_intent:{customer_id}"));
        Ok(SetupIntent {
            id: "seti_1".into(),
            client_secret: "seti_1_secret".into(),
        })
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        trial_period_days: u32,
    ) -> ExtoResult<ProviderSubscription> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("subscription:{customer_id}:{trial_period_days}"));
        Ok(ProviderSubscription {
            id: "sub_1".into(),
            status: SubscriptionStatus::Trialing,
        })
    }

    async fn create_meter_event(
        &self,
        customer_id: &str,
        event_name: &str,
        value: u64,
    ) -> ExtoResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("meter:{customer_id}:{event_name}:{value}"));
        Ok(())
    }
}

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    exto_db::run_migrations(&db).await.unwrap();
    db
}

fn organizations(db: &Surreal<Db>) -> Arc<Organizations> {
    let config = ScanConfig::default();
    Arc::new(OrganizationService::new(
        SurrealOrganizationRepository::new(db.clone()),
        SurrealScanHistoryRepository::new(db.clone()),
        SurrealTenantRepository::new(db.clone()),
        BoundedTtlCache::new(config.last_active_capacity, config.last_active_threshold),
        config.last_active_threshold,
    ))
}

fn accounts(db: &Surreal<Db>) -> Accounts {
    AccountService::new(
        SurrealRegistrationRepository::new(db.clone()),
        SurrealIdentityRepository::new(db.clone()),
        SurrealUserRepository::new(db.clone()),
        SurrealOrganizationRepository::new(db.clone()),
        organizations(db),
        SurrealTenantRepository::new(db.clone()),
    )
}

fn registry(db: &Surreal<Db>) -> Arc<Registry> {
    Arc::new(CategoryRegistry::new(
        SurrealCategoryRepository::new(db.clone()),
        SurrealFormatRepository::new(db.clone()),
        BoundedTtlCache::new(16, std::time::Duration::from_secs(60)),
    ))
}

fn billing() -> Billing {
    Billing {
        full_name: "Olive Owner".into(),
        email: "billing@example.com".into(),
        country: "NL".into(),
        ..Default::default()
    }
}

async fn invoice_category(registry: &Registry) -> Category {
    registry
        .create(CreateCategory {
            name: "Invoice".into(),
            slug: "invoice".into(),
            version: "1".into(),
            primary_field: Some("invoice_no".into()),
            fields: vec![
                Field::new("invoice_no", "Invoice No", FieldType::Text),
                Field::new("vendor", "Vendor", FieldType::Text),
                Field::table(
                    "line_items",
                    "Line Items",
                    vec![
                        Field::new("description", "Description", FieldType::Text),
                        Field::new("amount", "Amount", FieldType::Currency),
                    ],
                ),
            ],
        })
        .await
        .unwrap()
}

/// Writes one record plus its history directly, bypassing extraction.
async fn recorded_invoice(db: &Surreal<Db>, ctx: &RequestContext, category: &Category) -> RecordedScan {
    let metadata = json!({
        "invoice_no": "INV-7",
        "vendor": "ACME, Inc",
        "line_items": [
            {"description": "Bolts", "amount": "10.00"},
            {"description": "Nuts", "amount": "4.50"}
        ]
    });
    SurrealScanHistoryRepository::new(db.clone())
        .record(
            &ctx.tenant().unwrap(),
            CreateCategoryData {
                category_id: category.id,
                format_id: None,
                metadata: metadata.as_object().cloned().unwrap(),
                raw_data: Map::new(),
                document_paths: vec!["uploads/x/abc_invoice.png".into()],
                organization_id: ctx.org.id,
            },
            CreateScanHistory {
                category_id: category.id,
                format_id: None,
                scan_code: "INV-7".into(),
                category_data_col: category.data_collection(),
                batch_id: Uuid::new_v4(),
                thumbnails: Vec::new(),
            },
        )
        .await
        .unwrap()
}

// -----------------------------------------------------------------------
// Accounts
// -----------------------------------------------------------------------

#[tokio::test]
async fn sign_up_creates_numbered_organization() {
    let db = setup().await;
    let accounts = accounts(&db);

    let first = accounts.sign_up(" Ada@Example.COM ", "Ada", "L").await.unwrap();
    assert_eq!(first.user.email, "ada@example.com");
    assert_eq!(first.org.slug, "org_1");
    assert_eq!(first.org.name, "ada@example.com's Organization");
    assert_eq!(first.user.organization_id, first.org.id);

    let second = accounts.sign_up("bob@example.com", "Bob", "B").await.unwrap();
    assert_eq!(second.org.slug, "org_2");

    let tables = SurrealTenantRepository::new(db.clone())
        .tables(&first.tenant().unwrap())
        .await
        .unwrap();
    assert_eq!(tables, ["sc_org_1__batch", "sc_org_1__scan_history"]);
}

#[tokio::test]
async fn sign_up_rejects_taken_or_invalid_email() {
    let db = setup().await;
    let accounts = accounts(&db);
    accounts.sign_up("ada@example.com", "Ada", "L").await.unwrap();

    let err = accounts
        .sign_up("ADA@example.com", "Other", "Ada")
        .await
        .unwrap_err();
    assert!(matches!(err, ExtoError::AlreadyExists { .. }), "{err:?}");

    let err = accounts.sign_up("not-an-email", "No", "One").await.unwrap_err();
    assert!(matches!(err, ExtoError::Validation { .. }));

    let orgs = SurrealOrganizationRepository::new(db.clone());
    assert_eq!(orgs.count().await.unwrap(), 1);
}

#[tokio::test]
async fn sign_up_skips_slugs_already_in_use() {
    let db = setup().await;
    let orgs = SurrealOrganizationRepository::new(db.clone());
    orgs.create(exto_core::models::organization::CreateOrganization {
        name: "Squatter".into(),
        slug: "org_2".into(),
        owner_id: None,
    })
    .await
    .unwrap();

    let ctx = accounts(&db).sign_up("eve@example.com", "Eve", "E").await.unwrap();
    assert_eq!(ctx.org.slug, "org_3");
}

#[tokio::test]
async fn delete_account_removes_owned_organizations() {
    let db = setup().await;
    let accounts = accounts(&db);
    let ctx = accounts.sign_up("ada@example.com", "Ada", "L").await.unwrap();
    let other = accounts.sign_up("bob@example.com", "Bob", "B").await.unwrap();

    accounts.delete_account(&ctx).await.unwrap();

    let orgs = SurrealOrganizationRepository::new(db.clone());
    let org = orgs.get_by_id(ctx.org.id).await.unwrap();
    assert!(org.deleted_at.is_some());
    assert!(!org.is_active);

    let tenants = SurrealTenantRepository::new(db.clone());
    assert!(tenants.tables(&ctx.tenant().unwrap()).await.unwrap().is_empty());
    assert_eq!(tenants.tables(&other.tenant().unwrap()).await.unwrap().len(), 2);

    let identities = SurrealIdentityRepository::new(db.clone());
    let err = identities.get_by_id(ctx.user.identity_id).await.unwrap_err();
    assert!(matches!(err, ExtoError::NotFound { .. }));
    assert!(identities.get_by_id(other.user.identity_id).await.is_ok());

    let users = SurrealUserRepository::new(db.clone());
    let err = users.get_by_id(ctx.user.id).await.unwrap_err();
    assert!(matches!(err, ExtoError::NotFound { .. }));
    let remaining = users
        .list_by_organization(ctx.org.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(remaining.total, 0);
    assert!(users.get_by_id(other.user.id).await.is_ok());
}

// -----------------------------------------------------------------------
// Metering and payments
// -----------------------------------------------------------------------

#[tokio::test]
async fn metering_skips_organizations_without_customer() {
    let db = setup().await;
    let ctx = accounts(&db).sign_up("ada@example.com", "Ada", "L").await.unwrap();
    let provider = FakeProvider::default();
    let meter = MeterService::new(
        SurrealOrganizationRepository::new(db.clone()),
        SurrealMeterEventRepository::new(db.clone()),
        provider.clone(),
    );

    assert!(!meter.record(ctx.org.id, "scan", 1).await.unwrap());
    meter.record_detached(&ctx, "scan", 1).await.unwrap();

    assert!(provider.calls().is_empty());
    let events = SurrealMeterEventRepository::new(db.clone())
        .list_by_organization(ctx.org.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(events.total, 0);
}

#[tokio::test]
async fn billing_setup_then_metered_usage() {
    let db = setup().await;
    let ctx = accounts(&db).sign_up("ada@example.com", "Ada", "L").await.unwrap();
    let provider = FakeProvider::default();
    let payments = PaymentService::new(
        SurrealOrganizationRepository::new(db.clone()),
        SurrealSubscriptionRepository::new(db.clone()),
        provider.clone(),
        &PaymentConfig::default(),
    );

    // No billing email anywhere yet.
    let err = payments.create_subscription(&ctx).await.unwrap_err();
    assert!(matches!(err, ExtoError::Validation { .. }));

    let intent = payments
        .create_setup_intent(&ctx, Some(billing()))
        .await
        .unwrap();
    assert_eq!(intent.client_secret, "seti_1_secret");

    let org = SurrealOrganizationRepository::new(db.clone())
        .get_by_id(ctx.org.id)
        .await
        .unwrap();
    assert_eq!(org.payment_customer_id.as_deref(), Some("cus_123"));
    assert_eq!(org.billing.email, "billing@example.com");

    let subscription = payments.create_subscription(&ctx).await.unwrap();
    assert_eq!(subscription.external_id, "sub_1");
    assert_eq!(subscription.status, SubscriptionStatus::Trialing);
    assert_eq!(subscription.billing_cycle, BillingCycle::Monthly);
    assert_eq!(subscription.trial_period_days, 7);
    let current = payments.current_subscription(&ctx).await.unwrap().unwrap();
    assert_eq!(current.id, subscription.id);

    let meter = MeterService::new(
        SurrealOrganizationRepository::new(db.clone()),
        SurrealMeterEventRepository::new(db.clone()),
        provider.clone(),
    );
    meter.record_detached(&ctx, "scan", 1).await.unwrap();

    assert_eq!(
        provider.calls(),
        [
            "customer:billing@example.com",
            "setup_intent:cus_123",
            "subscription:cus_123:7",
            "meter:cus_123:scan:1",
        ]
    );
    let events = SurrealMeterEventRepository::new(db.clone())
        .list_by_organization(ctx.org.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(events.total, 1);
    assert_eq!(events.items[0].payment_customer_id, "cus_123");
    assert_eq!(events.items[0].event_value, 1);
}

// -----------------------------------------------------------------------
// Records and export
// -----------------------------------------------------------------------

#[tokio::test]
async fn patch_merges_and_removes_metadata_keys() {
    let db = setup().await;
    let ctx = accounts(&db).sign_up("ada@example.com", "Ada", "L").await.unwrap();
    let registry = registry(&db);
    let category = invoice_category(&registry).await;
    let recorded = recorded_invoice(&db, &ctx, &category).await;

    let records = CategoryDataService::new(
        Arc::clone(&registry),
        SurrealCategoryDataRepository::new(db.clone()),
        SurrealScanHistoryRepository::new(db.clone()),
    );
    let patch = json!({"vendor": null, "invoice_no": "INV-7b", "note": "checked"});
    let updated = records
        .patch_metadata(
            &ctx,
            category.id,
            recorded.category_data.id,
            patch.as_object().cloned().unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(updated.metadata["invoice_no"], "INV-7b");
    assert_eq!(updated.metadata["note"], "checked");
    assert!(!updated.metadata.contains_key("vendor"));
    assert_eq!(updated.metadata["line_items"].as_array().unwrap().len(), 2);
    assert_eq!(updated.document_paths, recorded.category_data.document_paths);

    let page = records.list(&ctx, category.id, Pagination::default()).await.unwrap();
    assert_eq!(page.total, 1);
    let histories = records.histories(&ctx, Pagination::default()).await.unwrap();
    assert_eq!(histories.items[0].scan_code, "INV-7");
}

fn cells(range: &Range<Data>) -> Vec<Vec<String>> {
    range
        .rows()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect()
}

#[tokio::test]
async fn export_writes_one_workbook() {
    let db = setup().await;
    let ctx = accounts(&db).sign_up("ada@example.com", "Ada", "L").await.unwrap();
    let registry = registry(&db);
    let category = invoice_category(&registry).await;
    let recorded = recorded_invoice(&db, &ctx, &category).await;

    let exports = TempDir::new().unwrap();
    let service = ExportService::new(
        registry,
        SurrealCategoryDataRepository::new(db.clone()),
        SurrealScanHistoryRepository::new(db.clone()),
        exports.path().to_path_buf(),
    );
    let exported = service
        .export(&ctx, recorded.scan_history.id)
        .await
        .unwrap();

    assert!(exported.path.starts_with(exports.path().join(ctx.org.id.to_string())));
    let file_name = exported.path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("export_invoice_"), "{file_name}");
    assert!(file_name.ends_with(".xlsx"), "{file_name}");
    assert_eq!(exported.sheets, ["Header", "line_items"]);

    let mut book: Xlsx<_> = open_workbook(&exported.path).unwrap();
    assert_eq!(book.sheet_names(), ["Header", "line_items"]);
    let header = book.worksheet_range("Header").unwrap();
    assert_eq!(cells(&header), [["Invoice No", "Vendor"], ["INV-7", "ACME, Inc"]]);
    let items = book.worksheet_range("line_items").unwrap();
    assert_eq!(
        cells(&items),
        [["Description", "Amount"], ["Bolts", "10.00"], ["Nuts", "4.50"]]
    );

    let err = service.export(&ctx, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ExtoError::NotFound { .. }));
}
