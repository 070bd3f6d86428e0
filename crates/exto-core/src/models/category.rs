//! Category domain model.
//!
//! A category is a tenant-defined schema for one class of document. Its
//! slug names the per-tenant collection holding extracted records
//! (`<slug>_data`), and `table` fields nest a child schema of their own.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ExtoError, ExtoResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Currency,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Boolean,
    Select,
    MultiSelect,
    Image,
    Url,
    Email,
    Phone,
    Address,
    Table,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Currency => "currency",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Boolean => "boolean",
            FieldType::Select => "select",
            FieldType::MultiSelect => "multi_select",
            FieldType::Image => "image",
            FieldType::Url => "url",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Address => "address",
            FieldType::Table => "table",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "text" => FieldType::Text,
            "number" => FieldType::Number,
            "currency" => FieldType::Currency,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "boolean" => FieldType::Boolean,
            "select" => FieldType::Select,
            "multi_select" => FieldType::MultiSelect,
            "image" => FieldType::Image,
            "url" => FieldType::Url,
            "email" => FieldType::Email,
            "phone" => FieldType::Phone,
            "address" => FieldType::Address,
            "table" => FieldType::Table,
            other => return Err(format!("unknown field type: {other}")),
        })
    }
}

/// One selectable value of a `select`/`multi_select` field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternative_names: Vec<String>,
}

/// A schema node. `children` is only meaningful for [`FieldType::Table`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Field>,
}

impl Field {
    pub fn new(name: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            field_type,
            options: Vec::new(),
            required: false,
            unique: false,
            children: Vec::new(),
        }
    }

    /// Builds a `table` field with the given child columns.
    pub fn table(name: impl Into<String>, label: impl Into<String>, children: Vec<Field>) -> Self {
        Self {
            children,
            ..Self::new(name, label, FieldType::Table)
        }
    }

    pub fn is_table(&self) -> bool {
        self.field_type == FieldType::Table
    }
}

/// Checks that names are unique among `fields` and, recursively, among
/// the children of every field.
pub fn validate_fields(fields: &[Field]) -> ExtoResult<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(ExtoError::validation("field name must not be empty"));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(ExtoError::validation(format!(
                "duplicate field name: {}",
                field.name
            )));
        }
        validate_fields(&field.children)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub version: String,
    /// Field whose extracted value becomes the human-facing scan code.
    pub primary_field: Option<String>,
    pub fields: Vec<Field>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Name of the tenant collection holding this category's records.
    pub fn data_collection(&self) -> String {
        format!("{}_data", self.slug)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn scalar_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_table())
    }

    pub fn table_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_table())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategory {
    pub name: String,
    pub slug: String,
    pub version: String,
    pub primary_field: Option<String>,
    pub fields: Vec<Field>,
}

impl CreateCategory {
    pub fn validate(&self) -> ExtoResult<()> {
        if self.slug.is_empty()
            || !self
                .slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ExtoError::validation(format!(
                "invalid category slug: {:?}",
                self.slug
            )));
        }
        validate_fields(&self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice_fields() -> Vec<Field> {
        vec![
            Field::new("invoice_no", "Invoice No", FieldType::Text),
            Field::new("total", "Total", FieldType::Currency),
            Field::table(
                "line_items",
                "Line Items",
                vec![
                    Field::new("description", "Description", FieldType::Text),
                    Field::new("qty", "Qty", FieldType::Number),
                ],
            ),
        ]
    }

    #[test]
    fn field_type_uses_snake_case_wire_names() {
        let json = serde_json::to_string(&FieldType::MultiSelect).unwrap();
        assert_eq!(json, "\"multi_select\"");
        let json = serde_json::to_string(&FieldType::DateTime).unwrap();
        assert_eq!(json, "\"datetime\"");
        assert_eq!("datetime".parse::<FieldType>().unwrap(), FieldType::DateTime);
    }

    #[test]
    fn nested_fields_deserialize_recursively() {
        let raw = serde_json::json!([{
            "name": "rows", "label": "Rows", "type": "table",
            "children": [{
                "name": "inner", "label": "Inner", "type": "table",
                "children": [{"name": "leaf", "label": "Leaf", "type": "text"}]
            }]
        }]);
        let fields: Vec<Field> = serde_json::from_value(raw).unwrap();
        assert_eq!(fields[0].children[0].children[0].name, "leaf");
        assert!(fields[0].children[0].is_table());
    }

    #[test]
    fn validate_rejects_duplicate_names_at_any_depth() {
        assert!(validate_fields(&invoice_fields()).is_ok());

        let mut dup = invoice_fields();
        dup.push(Field::new("total", "Total again", FieldType::Number));
        assert!(validate_fields(&dup).is_err());

        let nested = vec![Field::table(
            "rows",
            "Rows",
            vec![
                Field::new("a", "A", FieldType::Text),
                Field::new("a", "A", FieldType::Text),
            ],
        )];
        assert!(validate_fields(&nested).is_err());
    }

    #[test]
    fn create_category_rejects_bad_slug() {
        let input = CreateCategory {
            name: "Invoice".into(),
            slug: "Invoice Docs".into(),
            version: "1".into(),
            primary_field: None,
            fields: invoice_fields(),
        };
        assert!(input.validate().is_err());
    }
}
