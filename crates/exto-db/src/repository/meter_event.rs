//! SurrealDB implementation of [`MeterEventRepository`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use exto_core::error::ExtoResult;
use exto_core::models::meter_event::{CreateMeterEvent, MeterEvent};
use exto_core::repository::{MeterEventRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::query::{CountRow, DEFAULT_QUERY_TIMEOUT, parse_uuid, timed};

#[derive(Debug, SurrealValue)]
struct MeterEventRow {
    organization_id: String,
    event_name: String,
    event_value: u64,
    payment_customer_id: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct MeterEventRowWithId {
    record_id: String,
    organization_id: String,
    event_name: String,
    event_value: u64,
    payment_customer_id: String,
    created_at: DateTime<Utc>,
}

impl MeterEventRow {
    fn into_meter_event(self, id: Uuid) -> Result<MeterEvent, DbError> {
        Ok(MeterEvent {
            id,
            organization_id: parse_uuid("organization", &self.organization_id)?,
            event_name: self.event_name,
            event_value: self.event_value,
            payment_customer_id: self.payment_customer_id,
            created_at: self.created_at,
        })
    }
}

impl MeterEventRowWithId {
    fn try_into_meter_event(self) -> Result<MeterEvent, DbError> {
        let id = parse_uuid("meter event", &self.record_id)?;
        MeterEventRow {
            organization_id: self.organization_id,
            event_name: self.event_name,
            event_value: self.event_value,
            payment_customer_id: self.payment_customer_id,
            created_at: self.created_at,
        }
        .into_meter_event(id)
    }
}

/// SurrealDB implementation of the MeterEvent repository.
#[derive(Clone)]
pub struct SurrealMeterEventRepository<C: Connection> {
    db: Surreal<C>,
    timeout: Duration,
}

impl<C: Connection> SurrealMeterEventRepository<C> {
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

    async fn page(&self, org: &str, pagination: Pagination) -> Result<Vec<MeterEvent>, DbError> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT meta::id(id) AS record_id, * FROM meter_event \
                     WHERE organization_id = $organization_id \
                     ORDER BY created_at DESC \
                     LIMIT $limit START $offset",
                )
                .bind(("organization_id", org.to_string()))
                .bind(("limit", pagination.limit))
                .bind(("offset", pagination.offset)),
        )
        .await?;
        let rows: Vec<MeterEventRowWithId> = result.take(0)?;
        rows.into_iter().map(|r| r.try_into_meter_event()).collect()
    }

    async fn count_for(&self, org: &str) -> Result<u64, DbError> {
        let mut result = timed(
            self.timeout,
            self.db
                .query(
                    "SELECT count() AS total FROM meter_event \
                     WHERE organization_id = $organization_id GROUP ALL",
                )
                .bind(("organization_id", org.to_string())),
        )
        .await?;
        let rows: Vec<CountRow> = result.take(0)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }
}

impl<C: Connection> MeterEventRepository for SurrealMeterEventRepository<C> {
    async fn create(&self, input: CreateMeterEvent) -> ExtoResult<MeterEvent> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = timed(
            self.timeout,
            self.db
                .query(
                    "CREATE type::record('meter_event', $id) SET \
                     organization_id = $organization_id, \
                     event_name = $event_name, event_value = $event_value, \
                     payment_customer_id = $payment_customer_id",
                )
                .bind(("id", id_str.clone()))
                .bind(("organization_id", input.organization_id.to_string()))
                .bind(("event_name", input.event_name))
                .bind(("event_value", input.event_value))
                .bind(("payment_customer_id", input.payment_customer_id)),
        )
        .await?;

        let mut result = result.check().map_err(|e| DbError::Query(e.to_string()))?;
        let rows: Vec<MeterEventRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "meter_event".into(),
            id: id_str,
        })?;

        Ok(row.into_meter_event(id)?)
    }

    async fn list_by_organization(
        &self,
        organization_id: Uuid,
        pagination: Pagination,
    ) -> ExtoResult<PaginatedResult<MeterEvent>> {
        let org = organization_id.to_string();
        let (items, total) =
            tokio::try_join!(self.page(&org, pagination), self.count_for(&org))?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
