//! Immutable audit record written once per processed scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanHistory {
    pub id: Uuid,
    pub category_id: Uuid,
    pub format_id: Option<Uuid>,
    pub scan_code: String,
    /// Collection holding the linked record, e.g. `invoice_data`.
    pub category_data_col: String,
    pub category_data_id: Uuid,
    pub batch_id: Uuid,
    /// Thumbnail images as `data:` URLs.
    pub thumbnails: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for a scan-history entry. The linked category-data id is
/// assigned when both records are written together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScanHistory {
    pub category_id: Uuid,
    pub format_id: Option<Uuid>,
    pub scan_code: String,
    pub category_data_col: String,
    pub batch_id: Uuid,
    pub thumbnails: Vec<String>,
}
