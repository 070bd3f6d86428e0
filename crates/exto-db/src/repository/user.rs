//! SurrealDB implementation of [`UserRepository`].
//!
//! A user is an identity's membership in one organization. The pair
//! `(organization_id, email)` is unique.

use std::time::Duration;

use chrono::{DateTime, Utc};
use exto_core::error::ExtoResult;
use exto_core::models::user::{CreateUser, UpdateUser, User, UserRole};
use exto_core::repository::{PaginatedResult, Pagination, UserRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::query::{CountRow, DEFAULT_QUERY_TIMEOUT, parse_uuid, timed};

#[derive(Debug, SurrealValue)]
struct UserRow {
    identity_id: String,
    organization_id: String,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct UserRowWithId {
    record_id: String,
    identity_id: String,
    organization_id: String,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_role(s: &str) -> Result<UserRole, DbError> {
    s.parse().map_err(DbError::Decode)
}

impl UserRow {
    fn into_user(self, id: Uuid) -> Result<User, DbError> {
        Ok(User {
            id,
            identity_id: parse_uuid("identity", &self.identity_id)?,
            organization_id: parse_uuid("organization", &self.organization_id)?,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            role: parse_role(&self.role)?,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl UserRowWithId {
    fn try_into_user(self) -> Result<User, DbError> {
        let id = parse_uuid("user", &self.record_id)?;
        UserRow {
            identity_id: self.identity_id,
            organization_id: self.organization_id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            role: self.role,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .into_user(id)
    }
}

fn not_found(id: impl ToString) -> DbError {
    DbError::NotFound {
        entity: "user".into(),
        id: id.to_string(),
    }
}

/// SurrealDB implementation of the User repository.
#[derive(Clone)]
pub struct SurrealUserRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealUserRepository<C> {
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

    async fn page_by_organization(
        &self,
        organization_id: &str,
        pagination: Pagination,
    ) -> Result<Vec<User>, DbError> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM user \
                     WHERE organization_id = $organization_id \
                     ORDER BY created_at ASC \
                     LIMIT $limit START $offset",
                )
                .bind(("organization_id", organization_id.to_string()))
                .bind(("limit", pagination.limit))
                .bind(("offset", pagination.offset)),
        )
        .await?;
        let rows: Vec<UserRowWithId> = result.take(0)?;
        rows.into_iter().map(|r| r.try_into_user()).collect()
    }

    async fn count_by_organization(&self, organization_id: &str) -> Result<u64, DbError> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT count() AS total FROM user \
                     WHERE organization_id = $organization_id GROUP ALL",
                )
                .bind(("organization_id", organization_id.to_string())),
        )
        .await?;
        let rows: Vec<CountRow> = result.take(0)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}

impl<C: Connection> UserRepository for SurrealUserRepository<C> {
    async fn create(&self, input: CreateUser) -> ExtoResult<User> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = timed(
            self.timeout,
            self.db
                .query(
                    "CREATE type::record('user', $id) SET \
                     identity_id = $identity_id, \
                     organization_id = $organization_id, \
                     email = $email, first_name = $first_name, \
                     last_name = $last_name, role = $role",
                )
                .bind(("id", id_str.clone()))
                .bind(("identity_id", input.identity_id.to_string()))
                .bind(("organization_id", input.organization_id.to_string()))
                .bind(("email", input.email))
                .bind(("first_name", input.first_name))
                .bind(("last_name", input.last_name))
                .bind(("role", input.role.as_str().to_string())),
        )
        .await?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_id(&self, id: Uuid) -> ExtoResult<User> {
        let id_str = id.to_string();
        let mut result = timed(
            self.timeout,
            self.db
                .query("SELECT * FROM type::record('user', $id)")
                .bind(("id", id_str.clone())),
        )
        .await?;

        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_user(id)?)
    }

    async fn get_by_email(&self, organization_id: Uuid, email: &str) -> ExtoResult<User> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM user \
                     WHERE organization_id = $organization_id AND email = $email",
                )
                .bind(("organization_id", organization_id.to_string()))
                .bind(("email", email.to_string())),
        )
        .await?;

        let rows: Vec<UserRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("email={email}")))?;

        Ok(row.try_into_user()?)
    }

    async fn exists(&self, organization_id: Uuid, email: &str) -> ExtoResult<bool> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT count() AS total FROM user \
                     WHERE organization_id = $organization_id AND email = $email \
                     GROUP ALL",
                )
                .bind(("organization_id", organization_id.to_string()))
                .bind(("email", email.to_string())),
        )
        .await?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().is_some_and(|r| r.total > 0))
    }

    async fn update(&self, id: Uuid, input: UpdateUser) -> ExtoResult<User> {
        let id_str = id.to_string();

        let mut sets = Vec::new();
        if input.first_name.is_some() {
            sets.push("first_name = $first_name");
        }
        if input.last_name.is_some() {
            sets.push("last_name = $last_name");
        }
        if input.role.is_some() {
            sets.push("role = $role");
        }
        if input.is_active.is_some() {
            sets.push("is_active = $is_active");
        }
        sets.push("updated_at = time::now()");

        let query = format!("UPDATE type::record('user', $id) SET {}", sets.join(", "));

        let mut builder = self.db.query(&query).bind(("id", id_str.clone()));
        if let Some(first_name) = input.first_name {
            builder = builder.bind(("first_name", first_name));
        }
        if let Some(last_name) = input.last_name {
            builder = builder.bind(("last_name", last_name));
        }
        if let Some(role) = input.role {
            builder = builder.bind(("role", role.as_str().to_string()));
        }
        if let Some(is_active) = input.is_active {
            builder = builder.bind(("is_active", is_active));
        }

        let result = timed(self.timeout, builder).await?;
        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<UserRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| not_found(&id_str))?;

        Ok(row.into_user(id)?)
    }

    async fn list_by_organization(
        &self,
        organization_id: Uuid,
        pagination: Pagination,
    ) -> ExtoResult<PaginatedResult<User>> {
        let org = organization_id.to_string();
        let (items, total) = tokio::try_join!(
            self.page_by_organization(&org, pagination),
            self.count_by_organization(&org),
        )?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn delete_by_organizations(&self, organization_ids: &[Uuid]) -> ExtoResult<()> {
        if organization_ids.is_empty() {
            return Ok(());
        }
        // One equality delete per organization, committed together.
        let statements: String = (0..organization_ids.len())
            .map(|i| format!("DELETE user WHERE organization_id = $org_{i};\n"))
            .collect();
        let mut query = self
            .db
            .query(format!("BEGIN TRANSACTION;\n{statements}COMMIT TRANSACTION;"));
        for (i, id) in organization_ids.iter().enumerate() {
            query = query.bind((format!("org_{i}"), id.to_string()));
        }
        timed(self.timeout, query)
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(())
    }
}
