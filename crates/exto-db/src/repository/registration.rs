//! SurrealDB implementation of [`RegistrationRepository`].
//!
//! Identity, organization and admin user are written inside one
//! `BEGIN ... COMMIT` block with pre-generated record ids, then read back
//! through the per-entity repositories.

use std::time::Duration;

use exto_core::error::{ExtoError, ExtoResult};
use exto_core::models::user::UserRole;
use exto_core::repository::{
    IdentityRepository, OrganizationRepository, RegisterAccount, Registration,
    RegistrationRepository, UserRepository,
};
use surrealdb::{Connection, Surreal};
use tracing::info;
use uuid::Uuid;

use super::{SurrealIdentityRepository, SurrealOrganizationRepository, SurrealUserRepository};
use crate::error::DbError;
use crate::query::{DEFAULT_QUERY_TIMEOUT, timed};

const REGISTER_SQL: &str = "\
BEGIN TRANSACTION;
CREATE type::record('identity', $identity_id) SET
    email = $email, first_name = $first_name, last_name = $last_name,
    current_org_id = $organization_id;
CREATE type::record('organization', $organization_id) SET
    name = $organization_name, slug = $organization_slug,
    owner_id = $identity_id;
CREATE type::record('user', $user_id) SET
    identity_id = $identity_id, organization_id = $organization_id,
    email = $email, first_name = $first_name, last_name = $last_name,
    role = $role;
COMMIT TRANSACTION;
";

/// SurrealDB implementation of the sign-up write.
#[derive(Clone)]
pub struct SurrealRegistrationRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealRegistrationRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self {
            db,
            timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<C: Connection> RegistrationRepository for SurrealRegistrationRepository<C> {
    async fn register(&self, input: RegisterAccount) -> ExtoResult<Registration> {
        let identities = SurrealIdentityRepository::new(self.db.clone()).with_timeout(self.timeout);
        match identities.get_by_email(&input.email).await {
            Ok(_) => {
                return Err(ExtoError::AlreadyExists {
                    entity: "identity".into(),
                });
            }
            Err(ExtoError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let identity_id = Uuid::new_v4();
        let organization_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        timed(
            self.timeout,
            self.db
                .query(REGISTER_SQL)
                .bind(("identity_id", identity_id.to_string()))
                .bind(("organization_id", organization_id.to_string()))
                .bind(("user_id", user_id.to_string()))
                .bind(("email", input.email.clone()))
                .bind(("first_name", input.first_name))
                .bind(("last_name", input.last_name))
                .bind(("organization_name", input.organization_name))
                .bind(("organization_slug", input.organization_slug))
                .bind(("role", UserRole::OrganizationAdmin.as_str().to_string())),
        )
        .await?
        .check()
        .map_err(|e| DbError::Query(e.to_string()))?;

        let organizations =
            SurrealOrganizationRepository::new(self.db.clone()).with_timeout(self.timeout);
        let users = SurrealUserRepository::new(self.db.clone()).with_timeout(self.timeout);

        let (identity, organization, user) = tokio::try_join!(
            identities.get_by_id(identity_id),
            organizations.get_by_id(organization_id),
            users.get_by_id(user_id),
        )?;

        info!(
            identity_id = %identity.id,
            org_id = %organization.id,
            org_slug = %organization.slug,
            "Account registered"
        );

        Ok(Registration {
            identity,
            organization,
            user,
        })
    }
}
