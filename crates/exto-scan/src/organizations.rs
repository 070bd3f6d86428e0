//! Organization service: scan-code sequence, last-active coalescing,
//! free-trial accounting and organization lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use exto_core::error::{ExtoError, ExtoResult};
use exto_core::models::organization::{Billing, Organization, UpdateOrganization};
use exto_core::models::subscription::FreeTrialInfo;
use exto_core::repository::{
    OrganizationRepository, PaginatedResult, Pagination, ScanHistoryRepository, TenantRepository,
};
use exto_core::tenant::{self, TenantNamespace};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cache::BoundedTtlCache;

/// Prefix of scan codes allocated from the organization counter.
pub const SCAN_CODE_PREFIX: &str = "SCAN-";

pub fn format_scan_code(n: u64) -> String {
    format!("{SCAN_CODE_PREFIX}{n}")
}

pub struct OrganizationService<O, S, T>
where
    O: OrganizationRepository,
    S: ScanHistoryRepository,
    T: TenantRepository,
{
    organizations: O,
    histories: S,
    tenants: T,
    /// Last persisted `last_active_at` per organization.
    last_active: BoundedTtlCache<Uuid, DateTime<Utc>>,
    threshold: chrono::Duration,
}

impl<O, S, T> OrganizationService<O, S, T>
where
    O: OrganizationRepository,
    S: ScanHistoryRepository,
    T: TenantRepository,
{
    /// `last_active` should use `threshold` as its TTL.
    pub fn new(
        organizations: O,
        histories: S,
        tenants: T,
        last_active: BoundedTtlCache<Uuid, DateTime<Utc>>,
        threshold: std::time::Duration,
    ) -> Self {
        Self {
            organizations,
            histories,
            tenants,
            last_active,
            threshold: chrono::Duration::from_std(threshold)
                .unwrap_or(chrono::Duration::minutes(10)),
        }
    }

    pub async fn get(&self, id: Uuid) -> ExtoResult<Organization> {
        self.organizations.get_by_id(id).await
    }

    pub async fn list(&self, pagination: Pagination) -> ExtoResult<PaginatedResult<Organization>> {
        self.organizations.list(pagination).await
    }

    /// Allocates the next `SCAN-<n>` code. Unique per organization under
    /// concurrency: the increment is a single atomic update.
    #[instrument(skip(self))]
    pub async fn next_scan_code(&self, org_id: Uuid) -> ExtoResult<String> {
        let n = self.organizations.increment_scan_counter(org_id).await?;
        let code = format_scan_code(n);
        debug!(scan_code = %code, "Scan code allocated");
        Ok(code)
    }

    pub async fn touch_last_active(&self, org_id: Uuid) -> ExtoResult<bool> {
        self.touch_last_active_at(org_id, Utc::now()).await
    }

    /// Persists `now` as the organization's last activity unless a write
    /// happened less than the threshold ago. Returns whether it wrote.
    pub async fn touch_last_active_at(&self, org_id: Uuid, now: DateTime<Utc>) -> ExtoResult<bool> {
        let recent = self
            .last_active
            .get(&org_id)
            .is_some_and(|last| now - last < self.threshold);
        if recent {
            return Ok(false);
        }

        self.organizations.set_last_active(org_id, now).await?;
        self.last_active.insert(org_id, now);
        debug!(org_id = %org_id, "Last activity recorded");
        Ok(true)
    }

    /// Trial usage as of the UTC date `today`.
    pub async fn free_trial(
        &self,
        org: &Organization,
        tenant: &TenantNamespace,
        today: NaiveDate,
    ) -> ExtoResult<FreeTrialInfo> {
        let count = self.histories.count(tenant).await?;
        Ok(FreeTrialInfo::compute(org.created_at, count, today))
    }

    #[instrument(skip(self, billing))]
    pub async fn update_billing(&self, org_id: Uuid, billing: Billing) -> ExtoResult<Organization> {
        if billing.email.trim().is_empty() {
            return Err(ExtoError::validation("billing email is required"));
        }
        self.organizations
            .update(
                org_id,
                UpdateOrganization {
                    billing: Some(billing),
                    ..Default::default()
                },
            )
            .await
    }

    /// Drops the tenant tables of every organization `identity_id` owns and
    /// soft-deletes the organizations. Returns the affected ids.
    #[instrument(skip(self))]
    pub async fn delete_owned_by(&self, identity_id: Uuid) -> ExtoResult<Vec<Uuid>> {
        let owned = self.organizations.list_by_owner(identity_id).await?;
        let mut deleted = Vec::with_capacity(owned.len());

        for org in owned {
            match tenant::org_handle(&org.slug) {
                Ok(ns) => self.tenants.drop_tenant(&ns).await?,
                Err(_) => warn!(org_id = %org.id, slug = %org.slug, "Organization has no tenant namespace"),
            }
            self.organizations
                .mark_deleted(org.id, Some(identity_id))
                .await?;
            self.last_active.remove(&org.id);
            info!(org_id = %org.id, "Organization deleted");
            deleted.push(org.id);
        }
        Ok(deleted)
    }
}
