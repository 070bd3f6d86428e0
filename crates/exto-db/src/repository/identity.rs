//! SurrealDB implementation of [`IdentityRepository`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use exto_core::error::ExtoResult;
use exto_core::models::identity::{CreateIdentity, Identity, UpdateIdentity};
use exto_core::repository::IdentityRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::query::{DEFAULT_QUERY_TIMEOUT, parse_opt_uuid, parse_uuid, timed};

#[derive(Debug, SurrealValue)]
struct IdentityRow {
    email: String,
    first_name: String,
    last_name: String,
    is_active: bool,
    current_org_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct IdentityRowWithId {
    record_id: String,
    email: String,
    first_name: String,
    last_name: String,
    is_active: bool,
    current_org_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl IdentityRow {
    fn into_identity(self, id: Uuid) -> Result<Identity, DbError> {
        Ok(Identity {
            id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            is_active: self.is_active,
            current_org_id: parse_opt_uuid("current organization", self.current_org_id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl IdentityRowWithId {
    fn try_into_identity(self) -> Result<Identity, DbError> {
        Ok(Identity {
            id: parse_uuid("identity", &self.record_id)?,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            is_active: self.is_active,
            current_org_id: parse_opt_uuid("current organization", self.current_org_id)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn not_found(id: impl ToString) -> DbError {
    DbError::NotFound {
        entity: "identity".into(),
        id: id.to_string(),
    }
}

/// SurrealDB implementation of the Identity repository.
#[derive(Clone)]
pub struct SurrealIdentityRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealIdentityRepository<C> {
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

impl<C: Connection> IdentityRepository for SurrealIdentityRepository<C> {
    async fn create(&self, input: CreateIdentity) -> ExtoResult<Identity> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = timed(
            self.timeout,
            self.db
                .query(
                    "CREATE type::record('identity', $id) SET \
                     email = $email, first_name = $first_name, \
                     last_name = $last_name, current_org_id = $current_org_id",
                )
                .bind(("id", id_str.clone()))
                .bind(("email", input.email))
                .bind(("first_name", input.first_name))
                .bind(("last_name", input.last_name))
                .bind((
                    "current_org_id",
                    input.current_org_id.map(|o| o.to_string()),
                )),
        )
        .await?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<IdentityRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_identity(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> ExtoResult<Identity> {
        let id_str = id.to_string();
        let mut result = timed(
            self.timeout,
            self.db
                .query("SELECT * FROM type::record('identity', $id)")
                .bind(("id", id_str.clone())),
        )
        .await?;

        let rows: Vec<IdentityRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_identity(id)?)
    }

    async fn get_by_email(&self, email: &str) -> ExtoResult<Identity> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * \
                     FROM identity WHERE email = $email",
                )
                .bind(("email", email.to_string())),
        )
        .await?;

        let rows: Vec<IdentityRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("email={email}")))?;

        Ok(row.try_into_identity()?)
    }

    async fn update(&self, id: Uuid, input: UpdateIdentity) -> ExtoResult<Identity> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.first_name.is_some() {
            sets.push("first_name = $first_name");
        }
        if input.last_name.is_some() {
            sets.push("last_name = $last_name");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        if input.current_org_id.is_some() {
            sets.push("current_org_id = $current_org_id");
        }
        sets.push("updated_at = time::now()");

        let query = format!(
            "UPDATE type::record('identity', $id) SET {}",
            sets.join(", ")
        );

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));
        if let Some(first_name) = input.first_name {
            builder = builder.bind(("first_name", first_name));
        }
        if let Some(last_name) = input.last_name {
            builder = builder.bind(("last_name", last_name));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }
        if let Some(org) = input.current_org_id {
            builder = builder.bind(("current_org_id", org.to_string()));
        }

        let result = timed(self.timeout, builder).await?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<IdentityRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_identity(id)?)
    }

    async fn delete(&self, id: Uuid) -> ExtoResult<()> {
        timed(
            self.timeout,
            self.db
                .query("DELETE type::record('identity', $id)")
                .bind(("id", id.to_string())),
        )
        .await?
        .check()
        .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }
}
