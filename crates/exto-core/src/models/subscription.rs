//! Subscription records mirroring the payment provider, plus free-trial
//! accounting.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of scans included in the free trial.
pub const FREE_TRIAL_SCANS: u64 = 250;

/// Length of the free trial, counted from organization creation.
pub const FREE_TRIAL_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Canceled,
    PastDue,
    Unpaid,
    Incomplete,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Incomplete => "incomplete",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "active" => SubscriptionStatus::Active,
            "trialing" => SubscriptionStatus::Trialing,
            "canceled" => SubscriptionStatus::Canceled,
            "past_due" => SubscriptionStatus::PastDue,
            "unpaid" => SubscriptionStatus::Unpaid,
            "incomplete" => SubscriptionStatus::Incomplete,
            other => return Err(format!("unknown subscription status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }
}

impl FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "yearly" => Ok(BillingCycle::Yearly),
            other => Err(format!("unknown billing cycle: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// Subscription id at the payment provider.
    pub external_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub trial_period_days: u32,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscription {
    pub organization_id: Uuid,
    pub external_id: String,
    pub started_at: DateTime<Utc>,
    pub trial_period_days: u32,
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
}

/// Free-trial usage for one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeTrialInfo {
    /// Scan-history entries recorded so far.
    pub record_count: u64,
    pub remaining_scans: u64,
    pub days_left: i64,
    pub trial_ends_at: DateTime<Utc>,
}

impl FreeTrialInfo {
    /// Computes trial usage from the organization's creation time and its
    /// recorded scan count, as seen on the UTC date `today`.
    pub fn compute(org_created_at: DateTime<Utc>, record_count: u64, today: NaiveDate) -> Self {
        let trial_ends_at = org_created_at + Duration::days(FREE_TRIAL_DAYS);
        let days_left = (trial_ends_at.date_naive() - today).num_days().max(0);
        Self {
            record_count,
            remaining_scans: FREE_TRIAL_SCANS.saturating_sub(record_count),
            days_left,
            trial_ends_at,
        }
    }
}
