//! Format domain model: extraction templates bound to a category.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::category::Category;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionPrompt {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

/// One instruction to the extraction model, targeting a category field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionField {
    pub name: String,
    pub category_field_name: String,
    #[serde(rename = "extraction_prompt")]
    pub prompt: ExtractionPrompt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Format {
    pub id: Uuid,
    pub name: String,
    pub category_id: Uuid,
    pub is_active: bool,
    pub extraction_fields: Vec<ExtractionField>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Format {
    /// Extraction fields whose target is not a top-level field of `category`.
    ///
    /// Storage does not enforce the reference, so callers use this to
    /// report drift between a format and its category.
    pub fn dangling_fields<'a>(&'a self, category: &Category) -> Vec<&'a ExtractionField> {
        self.extraction_fields
            .iter()
            .filter(|ef| category.field(&ef.category_field_name).is_none())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFormat {
    pub name: String,
    pub category_id: Uuid,
    pub extraction_fields: Vec<ExtractionField>,
}
