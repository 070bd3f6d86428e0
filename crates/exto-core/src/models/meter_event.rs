//! Usage events reported to the payment provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterEvent {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub event_name: String,
    pub event_value: u64,
    pub payment_customer_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMeterEvent {
    pub organization_id: Uuid,
    pub event_name: String,
    pub event_value: u64,
    pub payment_customer_id: String,
}
