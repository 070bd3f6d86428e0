//! Extracted records stored in a tenant's `<category-slug>_data` collection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One processed document.
///
/// `metadata` is keyed by category field name; table fields hold an array
/// of row objects. It is not validated against the category at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryData {
    pub id: Uuid,
    pub category_id: Uuid,
    pub format_id: Option<Uuid>,
    pub metadata: Map<String, Value>,
    /// Full extraction payload including confidence scores.
    pub raw_data: Map<String, Value>,
    pub document_paths: Vec<String>,
    pub organization_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryData {
    pub category_id: Uuid,
    pub format_id: Option<Uuid>,
    pub metadata: Map<String, Value>,
    pub raw_data: Map<String, Value>,
    pub document_paths: Vec<String>,
    pub organization_id: Uuid,
}
