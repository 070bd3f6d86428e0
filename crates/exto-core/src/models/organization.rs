//! Organization domain model.
//!
//! Organizations are the tenant root. Each one owns an isolated storage
//! namespace derived from its slug, so the slug never changes once
//! assigned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A customer account and the owner of one tenant namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// URL-safe unique identifier (e.g., `org_12`).
    pub slug: String,
    /// Identity that created the organization at sign-up.
    pub owner_id: Option<Uuid>,
    pub is_active: bool,
    /// Last value handed out by the scan-code sequence.
    pub scan_counter: u64,
    pub last_active_at: Option<DateTime<Utc>>,
    pub billing: Billing,
    /// Customer id at the external payment provider, once created.
    pub payment_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Billing contact details mirrored to the payment provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Billing {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub street_address: String,
    pub country: String,
    pub state: String,
    pub city: String,
    pub zip_code: String,
}

/// Fields required to create a new organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
    pub slug: String,
    pub owner_id: Option<Uuid>,
}

/// Fields that can be updated on an existing organization.
///
/// The slug is deliberately absent: tenant table names are derived from it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateOrganization {
    pub name: Option<String>,
    pub owner_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub billing: Option<Billing>,
    pub payment_customer_id: Option<String>,
}
