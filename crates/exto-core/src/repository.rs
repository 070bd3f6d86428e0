//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Tenant-scoped repositories take a
//! [`TenantNamespace`] so that every query is addressed to exactly one
//! organization's collections.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ExtoResult;
use crate::models::{
    batch::{Batch, BatchStatus, CreateBatch},
    category::{Category, CreateCategory},
    category_data::{CategoryData, CreateCategoryData},
    format::{CreateFormat, Format},
    identity::{CreateIdentity, Identity, UpdateIdentity},
    meter_event::{CreateMeterEvent, MeterEvent},
    organization::{CreateOrganization, Organization, UpdateOrganization},
    scan_history::{CreateScanHistory, ScanHistory},
    subscription::{CreateSubscription, Subscription},
    user::{CreateUser, UpdateUser, User},
};
use crate::tenant::TenantNamespace;

/// Page size used when the caller asks for none.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Upper bound on any page size.
pub const MAX_PAGE_SIZE: u64 = 100;

/// Pagination parameters for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Converts a 1-based page request, clamping out-of-range input: pages
    /// below 1 become 1, page sizes below 1 fall back to the default and
    /// sizes above the maximum are capped.
    pub fn from_page(page: i64, page_size: i64) -> Self {
        let page = page.max(1) as u64;
        let limit = if page_size < 1 {
            DEFAULT_PAGE_SIZE
        } else {
            (page_size as u64).min(MAX_PAGE_SIZE)
        };
        Self {
            offset: (page - 1).saturating_mul(limit),
            limit,
        }
    }

    /// 1-based page number of this window.
    pub fn page(&self) -> u64 {
        if self.limit == 0 {
            1
        } else {
            self.offset / self.limit + 1
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

impl<T> PaginatedResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginatedResult<U> {
        PaginatedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            offset: self.offset,
            limit: self.limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Core namespace
// ---------------------------------------------------------------------------

pub trait OrganizationRepository: Send + Sync {
    fn create(
        &self,
        input: CreateOrganization,
    ) -> impl Future<Output = ExtoResult<Organization>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ExtoResult<Organization>> + Send;
    fn get_by_slug(&self, slug: &str) -> impl Future<Output = ExtoResult<Organization>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateOrganization,
    ) -> impl Future<Output = ExtoResult<Organization>> + Send;
    fn count(&self) -> impl Future<Output = ExtoResult<u64>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = ExtoResult<PaginatedResult<Organization>>> + Send;
    /// Live (not soft-deleted) organizations created by `owner_id`.
    fn list_by_owner(
        &self,
        owner_id: Uuid,
    ) -> impl Future<Output = ExtoResult<Vec<Organization>>> + Send;
    /// Atomically increments `scan_counter` and returns the new value.
    fn increment_scan_counter(&self, id: Uuid) -> impl Future<Output = ExtoResult<u64>> + Send;
    fn set_last_active(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> impl Future<Output = ExtoResult<()>> + Send;
    /// Sets the soft-delete marker and deactivates the organization.
    fn mark_deleted(
        &self,
        id: Uuid,
        deleted_by: Option<Uuid>,
    ) -> impl Future<Output = ExtoResult<()>> + Send;
}

pub trait IdentityRepository: Send + Sync {
    fn create(&self, input: CreateIdentity) -> impl Future<Output = ExtoResult<Identity>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ExtoResult<Identity>> + Send;
    fn get_by_email(&self, email: &str) -> impl Future<Output = ExtoResult<Identity>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateIdentity,
    ) -> impl Future<Output = ExtoResult<Identity>> + Send;
    fn delete(&self, id: Uuid) -> impl Future<Output = ExtoResult<()>> + Send;
}

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = ExtoResult<User>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ExtoResult<User>> + Send;
    fn get_by_email(
        &self,
        organization_id: Uuid,
        email: &str,
    ) -> impl Future<Output = ExtoResult<User>> + Send;
    fn exists(
        &self,
        organization_id: Uuid,
        email: &str,
    ) -> impl Future<Output = ExtoResult<bool>> + Send;
    fn update(&self, id: Uuid, input: UpdateUser) -> impl Future<Output = ExtoResult<User>> + Send;
    fn list_by_organization(
        &self,
        organization_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = ExtoResult<PaginatedResult<User>>> + Send;
    fn delete_by_organizations(
        &self,
        organization_ids: &[Uuid],
    ) -> impl Future<Output = ExtoResult<()>> + Send;
}

/// Input for the sign-up flow.
#[derive(Debug, Clone)]
pub struct RegisterAccount {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub organization_name: String,
    pub organization_slug: String,
}

/// Records created together by [`RegistrationRepository::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub identity: Identity,
    pub organization: Organization,
    pub user: User,
}

/// Creates identity, organization and admin user as one unit: either all
/// three exist afterwards or none does.
pub trait RegistrationRepository: Send + Sync {
    fn register(
        &self,
        input: RegisterAccount,
    ) -> impl Future<Output = ExtoResult<Registration>> + Send;
}

pub trait CategoryRepository: Send + Sync {
    fn create(&self, input: CreateCategory) -> impl Future<Output = ExtoResult<Category>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ExtoResult<Category>> + Send;
    fn count(&self) -> impl Future<Output = ExtoResult<u64>> + Send;
    /// Newest first.
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = ExtoResult<PaginatedResult<Category>>> + Send;
}

pub trait FormatRepository: Send + Sync {
    fn create(&self, input: CreateFormat) -> impl Future<Output = ExtoResult<Format>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = ExtoResult<Format>> + Send;
    /// Formats of one category, oldest first.
    fn list_by_category(
        &self,
        category_id: Uuid,
    ) -> impl Future<Output = ExtoResult<Vec<Format>>> + Send;
}

pub trait MeterEventRepository: Send + Sync {
    fn create(
        &self,
        input: CreateMeterEvent,
    ) -> impl Future<Output = ExtoResult<MeterEvent>> + Send;
    fn list_by_organization(
        &self,
        organization_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = ExtoResult<PaginatedResult<MeterEvent>>> + Send;
}

pub trait SubscriptionRepository: Send + Sync {
    /// Stores a subscription as the organization's current one.
    fn create(
        &self,
        input: CreateSubscription,
    ) -> impl Future<Output = ExtoResult<Subscription>> + Send;
    fn get_current(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = ExtoResult<Option<Subscription>>> + Send;
}

// ---------------------------------------------------------------------------
// Tenant namespaces
// ---------------------------------------------------------------------------

/// Lifecycle of per-organization collections.
pub trait TenantRepository: Send + Sync {
    /// Defines the batch and scan-history collections (idempotent).
    fn provision(&self, tenant: &TenantNamespace) -> impl Future<Output = ExtoResult<()>> + Send;
    /// Defines a category's data collection (idempotent).
    fn provision_category(
        &self,
        tenant: &TenantNamespace,
        category_slug: &str,
    ) -> impl Future<Output = ExtoResult<()>> + Send;
    /// Drops every collection of the namespace.
    fn drop_tenant(&self, tenant: &TenantNamespace) -> impl Future<Output = ExtoResult<()>> + Send;
}

pub trait BatchRepository: Send + Sync {
    fn create(
        &self,
        tenant: &TenantNamespace,
        input: CreateBatch,
    ) -> impl Future<Output = ExtoResult<Batch>> + Send;
    fn get_by_id(
        &self,
        tenant: &TenantNamespace,
        id: Uuid,
    ) -> impl Future<Output = ExtoResult<Batch>> + Send;
    fn list(
        &self,
        tenant: &TenantNamespace,
        pagination: Pagination,
    ) -> impl Future<Output = ExtoResult<PaginatedResult<Batch>>> + Send;
    /// Moves a batch from `from` to `to` in one conditional write.
    /// Returns `None` when no batch with that id is currently in `from`.
    fn transition(
        &self,
        tenant: &TenantNamespace,
        id: Uuid,
        from: BatchStatus,
        to: BatchStatus,
    ) -> impl Future<Output = ExtoResult<Option<Batch>>> + Send;
}

pub trait CategoryDataRepository: Send + Sync {
    fn get_by_id(
        &self,
        tenant: &TenantNamespace,
        category_slug: &str,
        id: Uuid,
    ) -> impl Future<Output = ExtoResult<CategoryData>> + Send;
    fn list(
        &self,
        tenant: &TenantNamespace,
        category_slug: &str,
        pagination: Pagination,
    ) -> impl Future<Output = ExtoResult<PaginatedResult<CategoryData>>> + Send;
    /// Replaces the metadata map; raw data and document paths are kept.
    fn update_metadata(
        &self,
        tenant: &TenantNamespace,
        category_slug: &str,
        id: Uuid,
        metadata: Map<String, Value>,
    ) -> impl Future<Output = ExtoResult<CategoryData>> + Send;
}

/// A category-data record and the scan-history entry pointing at it.
#[derive(Debug, Clone)]
pub struct RecordedScan {
    pub category_data: CategoryData,
    pub scan_history: ScanHistory,
}

pub trait ScanHistoryRepository: Send + Sync {
    /// Writes the category-data record and its scan-history entry in one
    /// transaction. The data goes to `history.category_data_col`.
    fn record(
        &self,
        tenant: &TenantNamespace,
        data: CreateCategoryData,
        history: CreateScanHistory,
    ) -> impl Future<Output = ExtoResult<RecordedScan>> + Send;
    fn get_by_id(
        &self,
        tenant: &TenantNamespace,
        id: Uuid,
    ) -> impl Future<Output = ExtoResult<ScanHistory>> + Send;
    /// Newest first.
    fn list(
        &self,
        tenant: &TenantNamespace,
        pagination: Pagination,
    ) -> impl Future<Output = ExtoResult<PaginatedResult<ScanHistory>>> + Send;
    fn count(&self, tenant: &TenantNamespace) -> impl Future<Output = ExtoResult<u64>> + Send;
}
