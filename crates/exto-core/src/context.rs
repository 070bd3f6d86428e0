//! Request context supplied by the authentication layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ExtoResult;
use crate::models::user::UserRole;
use crate::tenant::{self, TenantNamespace};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestUser {
    pub id: Uuid,
    pub identity_id: Uuid,
    pub organization_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOrg {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

/// Resolved caller and organization. Core operations trust it as given.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub user: RequestUser,
    pub org: RequestOrg,
}

impl RequestContext {
    /// Namespace of the caller's organization.
    pub fn tenant(&self) -> ExtoResult<TenantNamespace> {
        tenant::org_handle(&self.org.slug)
    }
}
