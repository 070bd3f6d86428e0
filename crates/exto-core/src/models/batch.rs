//! Batch domain model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ExtoError, ExtoResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchStatus {
    Open,
    Closed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Open => "Open",
            BatchStatus::Closed => "Closed",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(BatchStatus::Open),
            "Closed" => Ok(BatchStatus::Closed),
            other => Err(format!("unknown batch status: {other}")),
        }
    }
}

/// A user-visible grouping of scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub name: String,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn is_open(&self) -> bool {
        self.status == BatchStatus::Open
    }

    /// Status after closing. `Closed` is terminal.
    pub fn close(&self) -> ExtoResult<BatchStatus> {
        match self.status {
            BatchStatus::Open => Ok(BatchStatus::Closed),
            BatchStatus::Closed => Err(ExtoError::validation(format!(
                "batch {} is already closed",
                self.id
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBatch {
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_is_terminal() {
        let now = Utc::now();
        let mut batch = Batch {
            id: Uuid::new_v4(),
            name: "March".into(),
            status: BatchStatus::Open,
            created_at: now,
            updated_at: now,
        };
        batch.status = batch.close().unwrap();
        assert_eq!(batch.status, BatchStatus::Closed);
        assert!(batch.close().is_err());
    }
}
