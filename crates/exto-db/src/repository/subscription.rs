//! SurrealDB implementation of [`SubscriptionRepository`].
//!
//! An organization has at most one current subscription: storing a new one
//! clears `is_current` on the previous rows in the same transaction.

use std::time::Duration;

use chrono::{DateTime, Utc};
use exto_core::error::ExtoResult;
use exto_core::models::subscription::{CreateSubscription, Subscription};
use exto_core::repository::SubscriptionRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::query::{DEFAULT_QUERY_TIMEOUT, parse_uuid, timed};

#[derive(Debug, SurrealValue)]
struct SubscriptionRowWithId {
    record_id: String,
    organization_id: String,
    external_id: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    trial_period_days: u32,
    billing_cycle: String,
    status: String,
    is_current: bool,
    created_at: DateTime<Utc>,
}

impl SubscriptionRowWithId {
    fn try_into_subscription(self) -> Result<Subscription, DbError> {
        Ok(Subscription {
            id: parse_uuid("subscription", &self.record_id)?,
            organization_id: parse_uuid("organization", &self.organization_id)?,
            external_id: self.external_id,
            started_at: self.started_at,
            ended_at: self.ended_at,
            trial_period_days: self.trial_period_days,
            billing_cycle: self.billing_cycle.parse().map_err(DbError::Decode)?,
            status: self.status.parse().map_err(DbError::Decode)?,
            is_current: self.is_current,
            created_at: self.created_at,
        })
    }
}

const CREATE_SQL: &str = "\
BEGIN TRANSACTION;
UPDATE subscription SET is_current = false
    WHERE organization_id = $organization_id AND is_current = true;
CREATE type::record('subscription', $id) SET
    organization_id = $organization_id, external_id = $external_id,
    started_at = $started_at, trial_period_days = $trial_period_days,
    billing_cycle = $billing_cycle, status = $status, is_current = true;
COMMIT TRANSACTION;
";

/// SurrealDB implementation of the Subscription repository.
#[derive(Clone)]
pub struct SurrealSubscriptionRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealSubscriptionRepository<C> {
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

    async fn get_by_id(&self, id: &str) -> Result<Subscription, DbError> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * \
                     FROM type::record('subscription', $id)",
                )
                .bind(("id", id.to_string())),
        )
        .await?;
        let rows: Vec<SubscriptionRowWithId> = result.take(0)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DbError::NotFound {
                entity: "subscription".into(),
                id: id.to_string(),
            })?
            .try_into_subscription()
    }
}

impl<C: Connection> SubscriptionRepository for SurrealSubscriptionRepository<C> {
    async fn create(&self, input: CreateSubscription) -> ExtoResult<Subscription> {
        let id_str = Uuid::new_v4().to_string();

        timed(
            self.timeout,
            self.db
                .query(CREATE_SQL)
                .bind(("id", id_str.clone()))
                .bind(("organization_id", input.organization_id.to_string()))
                .bind(("external_id", input.external_id))
                .bind(("started_at", input.started_at))
                .bind(("trial_period_days", input.trial_period_days))
                .bind(("billing_cycle", input.billing_cycle.as_str().to_string()))
                .bind(("status", input.status.as_str().to_string())),
        )
        .await?
        .check()
        .map_err(|e| DbError::Query(e.to_string()))?;

        Ok(self.get_by_id(&id_str).await?)
    }

    async fn get_current(&self, organization_id: Uuid) -> ExtoResult<Option<Subscription>> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM subscription \
                     WHERE organization_id = $organization_id AND is_current = true \
                     ORDER BY created_at DESC LIMIT 1",
                )
                .bind(("organization_id", organization_id.to_string())),
        )
        .await?;

        let rows: Vec<SubscriptionRowWithId> = result.take(0).map_err(DbError::from)?;
        let current = rows
            .into_iter()
            .next()
            .map(|r| r.try_into_subscription())
            .transpose()?;
        Ok(current)
    }
}
