//! Integration tests for the organization, identity and user repositories
//! using in-memory SurrealDB.

use std::collections::BTreeSet;

use chrono::{TimeZone, Utc};
use exto_core::error::ExtoError;
use exto_core::models::identity::{CreateIdentity, UpdateIdentity};
use exto_core::models::organization::{Billing, CreateOrganization, UpdateOrganization};
use exto_core::models::user::{CreateUser, UserRole};
use exto_core::repository::{
    IdentityRepository, OrganizationRepository, Pagination, RegisterAccount,
    RegistrationRepository, UserRepository,
};
use exto_db::repository::{
    SurrealIdentityRepository, SurrealOrganizationRepository, SurrealRegistrationRepository,
    SurrealUserRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    exto_db::run_migrations(&db).await.unwrap();
    db
}

fn new_org(name: &str, slug: &str) -> CreateOrganization {
    CreateOrganization {
        name: name.into(),
        slug: slug.into(),
        owner_id: None,
    }
}

// -----------------------------------------------------------------------
// Organizations
// -----------------------------------------------------------------------

#[tokio::test]
async fn create_and_get_organization() {
    let db = setup().await;
    let repo = SurrealOrganizationRepository::new(db);

    let org = repo.create(new_org("ACME Corp", "acme")).await.unwrap();
    assert_eq!(org.slug, "acme");
    assert_eq!(org.scan_counter, 0);
    assert!(org.is_active);
    assert!(org.last_active_at.is_none());
    assert_eq!(org.billing, Billing::default());

    let fetched = repo.get_by_id(org.id).await.unwrap();
    assert_eq!(fetched.id, org.id);
    assert_eq!(fetched.name, "ACME Corp");

    let by_slug = repo.get_by_slug("acme").await.unwrap();
    assert_eq!(by_slug.id, org.id);
}

#[tokio::test]
async fn duplicate_slug_is_rejected() {
    let db = setup().await;
    let repo = SurrealOrganizationRepository::new(db);

    repo.create(new_org("One", "same")).await.unwrap();
    let err = repo.create(new_org("Two", "same")).await.unwrap_err();
    assert!(matches!(err, ExtoError::AlreadyExists { .. }), "{err:?}");
}

#[tokio::test]
async fn update_billing_and_customer() {
    let db = setup().await;
    let repo = SurrealOrganizationRepository::new(db);
    let org = repo.create(new_org("Billing", "billing")).await.unwrap();

    let billing = Billing {
        full_name: "Ada Lovelace".into(),
        email: "ada@example.com".into(),
        city: "London".into(),
        ..Billing::default()
    };
    let updated = repo
        .update(
            org.id,
            UpdateOrganization {
                billing: Some(billing.clone()),
                payment_customer_id: Some("cus_123".into()),
                ..UpdateOrganization::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.billing, billing);
    assert_eq!(updated.payment_customer_id.as_deref(), Some("cus_123"));
    assert_eq!(updated.slug, "billing");
}

#[tokio::test]
async fn get_missing_organization_is_not_found() {
    let db = setup().await;
    let repo = SurrealOrganizationRepository::new(db);

    let err = repo.get_by_id(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ExtoError::NotFound { .. }));
    let err = repo
        .increment_scan_counter(uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtoError::NotFound { .. }));
}

#[tokio::test]
async fn scan_counter_increments_sequentially() {
    let db = setup().await;
    let repo = SurrealOrganizationRepository::new(db);
    let org = repo.create(new_org("Counter", "counter")).await.unwrap();

    assert_eq!(repo.increment_scan_counter(org.id).await.unwrap(), 1);
    assert_eq!(repo.increment_scan_counter(org.id).await.unwrap(), 2);
    assert_eq!(repo.increment_scan_counter(org.id).await.unwrap(), 3);
    assert_eq!(repo.get_by_id(org.id).await.unwrap().scan_counter, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_yield_distinct_values() {
    let db = setup().await;
    let repo = SurrealOrganizationRepository::new(db);
    let org = repo.create(new_org("Race", "race")).await.unwrap();

    const TASKS: u64 = 16;
    let mut handles = Vec::new();
    for _ in 0..TASKS {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            repo.increment_scan_counter(org.id).await.unwrap()
        }));
    }

    let mut seen = BTreeSet::new();
    for handle in handles {
        seen.insert(handle.await.unwrap());
    }

    let expected: BTreeSet<u64> = (1..=TASKS).collect();
    assert_eq!(seen, expected);
    assert_eq!(repo.get_by_id(org.id).await.unwrap().scan_counter, TASKS);
}

#[tokio::test]
async fn last_active_and_soft_delete() {
    let db = setup().await;
    let repo = SurrealOrganizationRepository::new(db);
    let owner = uuid::Uuid::new_v4();
    let org = repo
        .create(CreateOrganization {
            name: "Owned".into(),
            slug: "owned".into(),
            owner_id: Some(owner),
        })
        .await
        .unwrap();

    let at = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
    repo.set_last_active(org.id, at).await.unwrap();
    assert_eq!(repo.get_by_id(org.id).await.unwrap().last_active_at, Some(at));

    assert_eq!(repo.list_by_owner(owner).await.unwrap().len(), 1);
    repo.mark_deleted(org.id, Some(owner)).await.unwrap();
    assert!(repo.list_by_owner(owner).await.unwrap().is_empty());

    let deleted = repo.get_by_id(org.id).await.unwrap();
    assert!(!deleted.is_active);
    assert!(deleted.deleted_at.is_some());
}

#[tokio::test]
async fn list_organizations_with_pagination() {
    let db = setup().await;
    let repo = SurrealOrganizationRepository::new(db);
    for i in 0..5 {
        repo.create(new_org(&format!("Org {i}"), &format!("org_{i}")))
            .await
            .unwrap();
    }

    let page = repo.list(Pagination { offset: 0, limit: 2 }).await.unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 5);

    let last = repo.list(Pagination { offset: 4, limit: 2 }).await.unwrap();
    assert_eq!(last.items.len(), 1);
    assert_eq!(repo.count().await.unwrap(), 5);
}

// -----------------------------------------------------------------------
// Identities and users
// -----------------------------------------------------------------------

#[tokio::test]
async fn identity_email_is_unique() {
    let db = setup().await;
    let repo = SurrealIdentityRepository::new(db);
    let input = CreateIdentity {
        email: "ada@example.com".into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        current_org_id: None,
    };

    let identity = repo.create(input.clone()).await.unwrap();
    assert_eq!(repo.get_by_email("ada@example.com").await.unwrap().id, identity.id);

    let err = repo.create(input).await.unwrap_err();
    assert!(matches!(err, ExtoError::AlreadyExists { .. }));

    let updated = repo
        .update(
            identity.id,
            UpdateIdentity {
                first_name: Some("Augusta".into()),
                ..UpdateIdentity::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.first_name, "Augusta");

    repo.delete(identity.id).await.unwrap();
    assert!(repo.get_by_id(identity.id).await.is_err());
}

#[tokio::test]
async fn users_are_scoped_to_organizations() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);
    let org_a = uuid::Uuid::new_v4();
    let org_b = uuid::Uuid::new_v4();
    let identity = uuid::Uuid::new_v4();

    for org in [org_a, org_b] {
        repo.create(CreateUser {
            identity_id: identity,
            organization_id: org,
            email: "ada@example.com".into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            role: UserRole::Member,
        })
        .await
        .unwrap();
    }

    assert!(repo.exists(org_a, "ada@example.com").await.unwrap());
    assert!(!repo.exists(org_a, "bob@example.com").await.unwrap());
    let user = repo.get_by_email(org_b, "ada@example.com").await.unwrap();
    assert_eq!(user.role, UserRole::Member);

    let page = repo
        .list_by_organization(org_a, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);

    repo.delete_by_organizations(&[org_a]).await.unwrap();
    assert!(!repo.exists(org_a, "ada@example.com").await.unwrap());
    assert!(repo.exists(org_b, "ada@example.com").await.unwrap());
}

#[tokio::test]
async fn delete_by_organizations_removes_every_listed_org() {
    let db = setup().await;
    let repo = SurrealUserRepository::new(db);
    let orgs = [
        uuid::Uuid::new_v4(),
        uuid::Uuid::new_v4(),
        uuid::Uuid::new_v4(),
    ];

    let mut users = Vec::new();
    for org in orgs {
        let user = repo
            .create(CreateUser {
                identity_id: uuid::Uuid::new_v4(),
                organization_id: org,
                email: "grace@example.com".into(),
                first_name: "Grace".into(),
                last_name: "Hopper".into(),
                role: UserRole::OrganizationAdmin,
            })
            .await
            .unwrap();
        users.push(user);
    }

    repo.delete_by_organizations(&[orgs[0], orgs[2]])
        .await
        .unwrap();

    for i in [0, 2] {
        let err = repo.get_by_id(users[i].id).await.unwrap_err();
        assert!(matches!(err, ExtoError::NotFound { .. }));
        let page = repo
            .list_by_organization(orgs[i], Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }
    assert_eq!(repo.get_by_id(users[1].id).await.unwrap().id, users[1].id);
    repo.delete_by_organizations(&[]).await.unwrap();
}

// -----------------------------------------------------------------------
// Registration
// -----------------------------------------------------------------------

fn registration(email: &str, slug: &str) -> RegisterAccount {
    RegisterAccount {
        email: email.into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        organization_name: format!("{email}'s Organization"),
        organization_slug: slug.into(),
    }
}

#[tokio::test]
async fn register_creates_identity_org_and_admin() {
    let db = setup().await;
    let repo = SurrealRegistrationRepository::new(db.clone());

    let reg = repo
        .register(registration("ada@example.com", "org_1"))
        .await
        .unwrap();

    assert_eq!(reg.organization.slug, "org_1");
    assert_eq!(reg.organization.owner_id, Some(reg.identity.id));
    assert_eq!(reg.identity.current_org_id, Some(reg.organization.id));
    assert_eq!(reg.user.role, UserRole::OrganizationAdmin);
    assert_eq!(reg.user.identity_id, reg.identity.id);
    assert_eq!(reg.user.organization_id, reg.organization.id);
}

#[tokio::test]
async fn duplicate_registration_leaves_no_partial_organization() {
    let db = setup().await;
    let repo = SurrealRegistrationRepository::new(db.clone());
    let orgs = SurrealOrganizationRepository::new(db);

    repo.register(registration("ada@example.com", "org_1"))
        .await
        .unwrap();

    let err = repo
        .register(registration("ada@example.com", "org_2"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExtoError::AlreadyExists { .. }), "{err:?}");

    assert_eq!(orgs.count().await.unwrap(), 1);
    assert!(orgs.get_by_slug("org_2").await.is_err());
}

#[tokio::test]
async fn failed_registration_transaction_rolls_back() {
    let db = setup().await;
    let repo = SurrealRegistrationRepository::new(db.clone());
    let orgs = SurrealOrganizationRepository::new(db.clone());
    let identities = SurrealIdentityRepository::new(db);

    repo.register(registration("ada@example.com", "org_1"))
        .await
        .unwrap();

    // Slug collision aborts the transaction after the identity write.
    let err = repo
        .register(registration("bob@example.com", "org_1"))
        .await
        .unwrap_err();
    assert!(!matches!(err, ExtoError::NotFound { .. }), "{err:?}");

    assert!(identities.get_by_email("bob@example.com").await.is_err());
    assert_eq!(orgs.count().await.unwrap(), 1);
}
