//! Integration tests for tenant-scoped repositories (batches, scan
//! history, category data) and tenant table lifecycle.

use exto_core::error::ExtoError;
use exto_core::models::batch::{BatchStatus, CreateBatch};
use exto_core::models::category::{CreateCategory, Field, FieldType};
use exto_core::models::category_data::CreateCategoryData;
use exto_core::models::format::{CreateFormat, ExtractionField, ExtractionPrompt};
use exto_core::models::scan_history::CreateScanHistory;
use exto_core::repository::{
    BatchRepository, CategoryDataRepository, CategoryRepository, FormatRepository, Pagination,
    ScanHistoryRepository, TenantRepository,
};
use exto_core::tenant::{self, TenantNamespace};
use exto_db::SurrealTenantRepository;
use exto_db::repository::{
    SurrealBatchRepository, SurrealCategoryDataRepository, SurrealCategoryRepository,
    SurrealFormatRepository, SurrealScanHistoryRepository,
};
use serde_json::{Map, Value, json};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    exto_db::run_migrations(&db).await.unwrap();
    db
}

fn acme() -> TenantNamespace {
    tenant::org_handle("acme").unwrap()
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

async fn record_scan(
    repo: &SurrealScanHistoryRepository<Db>,
    tenant: &TenantNamespace,
    batch_id: Uuid,
    code: &str,
) -> exto_core::repository::RecordedScan {
    let category_id = Uuid::new_v4();
    repo.record(
        tenant,
        CreateCategoryData {
            category_id,
            format_id: None,
            metadata: object(json!({"invoice_number": code, "total": 12.5})),
            raw_data: object(json!({"averageConfidence": 90})),
            document_paths: vec![format!("uploads/org/{code}.png")],
            organization_id: Uuid::new_v4(),
        },
        CreateScanHistory {
            category_id,
            format_id: None,
            scan_code: code.into(),
            category_data_col: tenant::category_data_collection("invoice"),
            batch_id,
            thumbnails: vec!["data:image/jpeg;base64,AAAA".into()],
        },
    )
    .await
    .unwrap()
}

// -----------------------------------------------------------------------
// Batches
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_list_and_close_batch() {
    let db = setup().await;
    let repo = SurrealBatchRepository::new(db);
    let tenant = acme();

    let batch = repo
        .create(&tenant, CreateBatch { name: "May".into() })
        .await
        .unwrap();
    assert_eq!(batch.status, BatchStatus::Open);

    let closed = repo
        .transition(&tenant, batch.id, BatchStatus::Open, BatchStatus::Closed)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed.status, BatchStatus::Closed);
    let again = repo
        .transition(&tenant, batch.id, BatchStatus::Open, BatchStatus::Closed)
        .await
        .unwrap();
    assert!(again.is_none());
    assert_eq!(
        repo.get_by_id(&tenant, batch.id).await.unwrap().status,
        BatchStatus::Closed
    );

    let page = repo.list(&tenant, Pagination::default()).await.unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn batches_are_isolated_per_tenant() {
    let db = setup().await;
    let repo = SurrealBatchRepository::new(db);
    let acme = acme();
    let other = tenant::org_handle("globex").unwrap();

    let batch = repo
        .create(&acme, CreateBatch { name: "A".into() })
        .await
        .unwrap();

    let err = repo.get_by_id(&other, batch.id).await.unwrap_err();
    assert!(matches!(err, ExtoError::NotFound { .. }));
    assert_eq!(repo.list(&other, Pagination::default()).await.unwrap().total, 0);
}

#[tokio::test]
async fn reads_before_first_write_are_empty() {
    let db = setup().await;
    let batches = SurrealBatchRepository::new(db.clone());
    let history = SurrealScanHistoryRepository::new(db.clone());
    let data = SurrealCategoryDataRepository::new(db);
    let fresh = tenant::org_handle("initech").unwrap();
    let id = Uuid::new_v4();

    let err = batches.get_by_id(&fresh, id).await.unwrap_err();
    assert!(matches!(err, ExtoError::NotFound { .. }));
    assert_eq!(batches.list(&fresh, Pagination::default()).await.unwrap().total, 0);
    let moved = batches
        .transition(&fresh, id, BatchStatus::Open, BatchStatus::Closed)
        .await
        .unwrap();
    assert!(moved.is_none());

    let err = history.get_by_id(&fresh, id).await.unwrap_err();
    assert!(matches!(err, ExtoError::NotFound { .. }));
    assert_eq!(history.count(&fresh).await.unwrap(), 0);

    let page = data
        .list(&fresh, "invoice", Pagination::default())
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total, 0);
    let err = data.get_by_id(&fresh, "invoice", id).await.unwrap_err();
    assert!(err.is_client_error());
    let err = data
        .update_metadata(&fresh, "invoice", id, Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtoError::NotFound { .. }));
}

#[tokio::test]
async fn core_namespace_rejects_tenant_collections() {
    let db = setup().await;
    let repo = SurrealBatchRepository::new(db);

    let err = repo
        .create(&tenant::core_handle(), CreateBatch { name: "x".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, ExtoError::TenantContext));
}

// -----------------------------------------------------------------------
// Scan history and category data
// -----------------------------------------------------------------------

#[tokio::test]
async fn record_writes_data_and_history_together() {
    let db = setup().await;
    let batches = SurrealBatchRepository::new(db.clone());
    let history = SurrealScanHistoryRepository::new(db.clone());
    let data = SurrealCategoryDataRepository::new(db);
    let tenant = acme();

    let batch = batches
        .create(&tenant, CreateBatch { name: "B".into() })
        .await
        .unwrap();
    let recorded = record_scan(&history, &tenant, batch.id, "INV-1").await;

    assert_eq!(recorded.scan_history.category_data_id, recorded.category_data.id);
    assert_eq!(recorded.scan_history.category_data_col, "invoice_data");
    assert_eq!(recorded.scan_history.batch_id, batch.id);
    assert_eq!(recorded.category_data.metadata["invoice_number"], json!("INV-1"));

    let stored = data
        .get_by_id(&tenant, "invoice", recorded.category_data.id)
        .await
        .unwrap();
    assert_eq!(stored.document_paths, vec!["uploads/org/INV-1.png".to_string()]);

    let entry = history
        .get_by_id(&tenant, recorded.scan_history.id)
        .await
        .unwrap();
    assert_eq!(entry.scan_code, "INV-1");
    assert_eq!(history.count(&tenant).await.unwrap(), 1);
}

#[tokio::test]
async fn scan_history_lists_newest_first() {
    let db = setup().await;
    let history = SurrealScanHistoryRepository::new(db);
    let tenant = acme();
    let batch_id = Uuid::new_v4();

    for code in ["SCAN-1", "SCAN-2", "SCAN-3"] {
        record_scan(&history, &tenant, batch_id, code).await;
    }

    let page = history
        .list(&tenant, Pagination { offset: 0, limit: 2 })
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].scan_code, "SCAN-3");
}

#[tokio::test]
async fn metadata_patch_keeps_raw_data() {
    let db = setup().await;
    let history = SurrealScanHistoryRepository::new(db.clone());
    let data = SurrealCategoryDataRepository::new(db);
    let tenant = acme();

    let recorded = record_scan(&history, &tenant, Uuid::new_v4(), "INV-9").await;
    let patched = data
        .update_metadata(
            &tenant,
            "invoice",
            recorded.category_data.id,
            object(json!({"invoice_number": "INV-10"})),
        )
        .await
        .unwrap();

    assert_eq!(patched.metadata["invoice_number"], json!("INV-10"));
    assert!(!patched.metadata.contains_key("total"));
    assert_eq!(patched.raw_data["averageConfidence"], json!(90));

    let page = data
        .list(&tenant, "invoice", Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

// -----------------------------------------------------------------------
// Tenant lifecycle
// -----------------------------------------------------------------------

#[tokio::test]
async fn provision_is_idempotent_and_drop_removes_tables() {
    let db = setup().await;
    let tenants = SurrealTenantRepository::new(db.clone());
    let history = SurrealScanHistoryRepository::new(db);
    let acme = acme();
    let other = tenant::org_handle("globex").unwrap();

    tenants.provision(&acme).await.unwrap();
    tenants.provision(&acme).await.unwrap();
    tenants.provision(&other).await.unwrap();
    record_scan(&history, &acme, Uuid::new_v4(), "SCAN-1").await;

    let tables = tenants.tables(&acme).await.unwrap();
    assert_eq!(
        tables,
        vec![
            "sc_acme__batch".to_string(),
            "sc_acme__invoice_data".to_string(),
            "sc_acme__scan_history".to_string(),
        ]
    );

    tenants.drop_tenant(&acme).await.unwrap();
    assert!(tenants.tables(&acme).await.unwrap().is_empty());
    assert_eq!(tenants.tables(&other).await.unwrap().len(), 2);
}

// -----------------------------------------------------------------------
// Categories and formats
// -----------------------------------------------------------------------

fn invoice_category() -> CreateCategory {
    CreateCategory {
        name: "Invoice".into(),
        slug: "invoice".into(),
        version: "1".into(),
        primary_field: Some("invoice_number".into()),
        fields: vec![
            Field::new("invoice_number", "Invoice Number", FieldType::Text),
            Field::table(
                "line_items",
                "Line Items",
                vec![
                    Field::new("description", "Description", FieldType::Text),
                    Field::new("amount", "Amount", FieldType::Currency),
                ],
            ),
        ],
    }
}

#[tokio::test]
async fn category_round_trips_nested_fields() {
    let db = setup().await;
    let repo = SurrealCategoryRepository::new(db);

    let created = repo.create(invoice_category()).await.unwrap();
    let fetched = repo.get_by_id(created.id).await.unwrap();

    assert_eq!(fetched.fields.len(), 2);
    assert!(fetched.fields[1].is_table());
    assert_eq!(fetched.fields[1].children.len(), 2);
    assert_eq!(fetched.fields[1].children[1].field_type, FieldType::Currency);

    let err = repo.create(invoice_category()).await.unwrap_err();
    assert!(matches!(err, ExtoError::AlreadyExists { .. }), "{err:?}");
}

#[tokio::test]
async fn category_list_respects_page_bounds() {
    let db = setup().await;
    let repo = SurrealCategoryRepository::new(db);
    for i in 0..3 {
        let mut input = invoice_category();
        input.slug = format!("invoice_{i}");
        input.name = format!("Invoice {i}");
        repo.create(input).await.unwrap();
    }

    let page = repo
        .list(Pagination::from_page(2, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].name, "Invoice 0");

    let beyond = repo.list(Pagination::from_page(5, 2)).await.unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.total, 3);
}

#[tokio::test]
async fn formats_are_listed_per_category() {
    let db = setup().await;
    let categories = SurrealCategoryRepository::new(db.clone());
    let formats = SurrealFormatRepository::new(db);
    let category = categories.create(invoice_category()).await.unwrap();

    let format = formats
        .create(CreateFormat {
            name: "Vendor A".into(),
            category_id: category.id,
            extraction_fields: vec![ExtractionField {
                name: "Invoice #".into(),
                category_field_name: "invoice_number".into(),
                prompt: ExtractionPrompt {
                    text: "The invoice number in the top right".into(),
                    sample_values: vec!["INV-0001".into()],
                    images: Vec::new(),
                },
            }],
        })
        .await
        .unwrap();

    let listed = formats.list_by_category(category.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, format.id);
    assert_eq!(listed[0].extraction_fields[0].prompt.sample_values, vec!["INV-0001"]);
    assert!(formats.list_by_category(Uuid::new_v4()).await.unwrap().is_empty());
}
