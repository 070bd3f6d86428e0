//! Sign-up and account deletion.

use std::sync::Arc;

use exto_core::context::{RequestContext, RequestOrg, RequestUser};
use exto_core::error::{ExtoError, ExtoResult};
use exto_core::repository::{
    IdentityRepository, OrganizationRepository, RegisterAccount, RegistrationRepository,
    ScanHistoryRepository, TenantRepository, UserRepository,
};
use exto_core::tenant;
use tracing::{debug, info, instrument};

use crate::organizations::OrganizationService;

/// Slugs probed past `org_<count + 1>` before giving up.
const SLUG_PROBES: u64 = 16;

pub struct AccountService<R, I, U, O, S, T>
where
    R: RegistrationRepository,
    I: IdentityRepository,
    U: UserRepository,
    O: OrganizationRepository,
    S: ScanHistoryRepository,
    T: TenantRepository,
{
    registrations: R,
    identities: I,
    users: U,
    organization_repo: O,
    organizations: Arc<OrganizationService<O, S, T>>,
    tenants: T,
}

impl<R, I, U, O, S, T> AccountService<R, I, U, O, S, T>
where
    R: RegistrationRepository,
    I: IdentityRepository,
    U: UserRepository,
    O: OrganizationRepository,
    S: ScanHistoryRepository,
    T: TenantRepository,
{
    pub fn new(
        registrations: R,
        identities: I,
        users: U,
        organization_repo: O,
        organizations: Arc<OrganizationService<O, S, T>>,
        tenants: T,
    ) -> Self {
        Self {
            registrations,
            identities,
            users,
            organization_repo,
            organizations,
            tenants,
        }
    }

    /// First unused `org_<n>` slug, starting from the organization count.
    async fn free_slug(&self) -> ExtoResult<String> {
        let start = self.organization_repo.count().await? + 1;
        for n in start..start + SLUG_PROBES {
            let slug = format!("org_{n}");
            match self.organization_repo.get_by_slug(&slug).await {
                Err(ExtoError::NotFound { .. }) => return Ok(slug),
                Ok(_) => debug!(slug = %slug, "Organization slug taken"),
                Err(e) => return Err(e),
            }
        }
        Err(ExtoError::Internal("no free organization slug".into()))
    }

    /// Creates identity, organization and admin user together and provisions
    /// the organization's tenant tables. A taken email is `AlreadyExists`
    /// and leaves nothing behind.
    #[instrument(skip(self, first_name, last_name))]
    pub async fn sign_up(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> ExtoResult<RequestContext> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(ExtoError::validation("a valid email is required"));
        }

        let slug = self.free_slug().await?;
        let registration = self
            .registrations
            .register(RegisterAccount {
                email: email.clone(),
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                organization_name: format!("{email}'s Organization"),
                organization_slug: slug,
            })
            .await?;

        let org = registration.organization;
        let user = registration.user;
        self.tenants.provision(&tenant::org_handle(&org.slug)?).await?;
        info!(org_id = %org.id, slug = %org.slug, "Account created");

        Ok(RequestContext {
            user: RequestUser {
                id: user.id,
                identity_id: user.identity_id,
                organization_id: user.organization_id,
                email: user.email,
                first_name: user.first_name,
                last_name: user.last_name,
                role: user.role,
                is_active: user.is_active,
            },
            org: RequestOrg {
                id: org.id,
                name: org.name,
                slug: org.slug,
            },
        })
    }

    /// Removes every organization the caller owns (tenant tables included),
    /// their users, then the caller's identity.
    #[instrument(skip(self, ctx), fields(identity_id = %ctx.user.identity_id))]
    pub async fn delete_account(&self, ctx: &RequestContext) -> ExtoResult<()> {
        let identity_id = ctx.user.identity_id;
        let org_ids = self.organizations.delete_owned_by(identity_id).await?;
        self.users.delete_by_organizations(&org_ids).await?;
        self.identities.delete(identity_id).await?;
        info!(organizations = org_ids.len(), "Account deleted");
        Ok(())
    }
}
