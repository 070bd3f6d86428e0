//! Cold-start document analysis.
//!
//! Given a document with no known category, ask the model for a
//! categorization and for every key/value pair it can find, then turn the
//! pairs into a suggested category schema.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{NaiveDate, NaiveDateTime};
use exto_core::models::category::{Field, FieldType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, ExtractResult};
use crate::model::{CompletionModel, CompletionRequest};
use crate::reply::{clean_reply, json_object_span};

const TRUNCATION_MARKER: &str = "... [truncated]";
const PDF_FILENAME: &str = "document.pdf";

const CATEGORIZE_INSTRUCTION: &str = r#"Classify the document below.

Respond with a single JSON object and nothing else:
{
  "category": "broad document class, e.g. Invoice, Contract, Tender",
  "sub_category": "more specific class",
  "confidence": "high | medium | low",
  "keywords": ["up to ten salient terms"],
  "summary": "two or three sentences describing the document",
  "metadata": {"any": "notable attributes such as issuer, dates or amounts"}
}
"#;

const KEY_VALUES_INSTRUCTION: &str = r#"List every labelled value in this document.

Return only a JSON object (no markdown, no commentary) shaped as:
{
  "key_values": [
    {"key": "snake_case_name", "value": "value as text", "description": "what the value represents"}
  ]
}

Rules:
- keys are snake_case, e.g. contract_no, tender_date
- keep keys whose value is blank, using ""
- write dates as YYYY-MM-DD where possible
- flatten sections into the one key_values array
"#;

/// Document content handed to the cold-start analyzer.
#[derive(Debug, Clone)]
pub enum DocumentPayload {
    /// Plain text already extracted from the document.
    Text(String),
    /// Raw PDF bytes, sent inline as a file part.
    Pdf { filename: String, bytes: Vec<u8> },
}

impl DocumentPayload {
    pub fn pdf(bytes: Vec<u8>) -> Self {
        Self::Pdf {
            filename: PDF_FILENAME.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentCategory {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sub_category: String,
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValueTriple {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct TriplesReply {
    #[serde(default)]
    key_values: Vec<KeyValueTriple>,
}

/// Result of a cold-start analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentAnalysis {
    pub category: DocumentCategory,
    pub triples: Vec<KeyValueTriple>,
    /// `triples` as a flat `key -> value` map.
    pub values: Map<String, Value>,
}

impl DocumentAnalysis {
    pub fn suggested_fields(&self) -> Vec<Field> {
        suggest_fields(&self.triples)
    }
}

pub struct DocumentAnalyzer<M> {
    model: M,
    config: ExtractionConfig,
}

impl<M: CompletionModel> DocumentAnalyzer<M> {
    pub fn new(model: M, config: ExtractionConfig) -> Self {
        Self { model, config }
    }

    /// Categorizes the document and extracts its key/value pairs. Both
    /// model calls run concurrently; either failure fails the analysis.
    #[instrument(skip_all)]
    pub async fn analyze(&self, payload: &DocumentPayload) -> ExtractResult<DocumentAnalysis> {
        let (category, triples) =
            tokio::try_join!(self.categorize(payload), self.key_values(payload))?;
        let values = flatten_triples(&triples);

        info!(
            category = %category.category,
            keys = values.len(),
            "Document analyzed"
        );
        Ok(DocumentAnalysis {
            category,
            triples,
            values,
        })
    }

    pub async fn categorize(&self, payload: &DocumentPayload) -> ExtractResult<DocumentCategory> {
        let request = CompletionRequest::new(&self.config.categorization_model)
            .max_tokens(self.config.categorization_max_tokens)
            .temperature(0.0);
        let request = match payload {
            DocumentPayload::Text(text) => request.text(format!(
                "{CATEGORIZE_INSTRUCTION}\nPDF Content:\n{}",
                truncate_text(text, self.config.max_text_chars)
            )),
            DocumentPayload::Pdf { filename, bytes } => request
                .text(CATEGORIZE_INSTRUCTION)
                .file(filename, pdf_data_url(bytes)),
        };

        let reply = self.model.complete(request).await?;
        serde_json::from_str(clean_reply(&reply))
            .map_err(|e| ExtractError::MalformedReply(format!("categorization: {e}")))
    }

    pub async fn key_values(&self, payload: &DocumentPayload) -> ExtractResult<Vec<KeyValueTriple>> {
        let request = CompletionRequest::new(&self.config.model);
        let request = match payload {
            DocumentPayload::Text(text) => request.text(format!(
                "{KEY_VALUES_INSTRUCTION}\nDocument:\n{}",
                truncate_text(text, self.config.max_text_chars)
            )),
            DocumentPayload::Pdf { filename, bytes } => request
                .text(KEY_VALUES_INSTRUCTION)
                .file(filename, pdf_data_url(bytes)),
        };

        let reply = self.model.complete(request).await?;
        let parsed: TriplesReply = serde_json::from_str(json_object_span(clean_reply(&reply)))
            .map_err(|e| ExtractError::MalformedReply(format!("key values: {e}")))?;
        Ok(parsed.key_values)
    }
}

fn pdf_data_url(bytes: &[u8]) -> String {
    format!("data:application/pdf;base64,{}", STANDARD.encode(bytes))
}

/// Cuts `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Flattens triples into `key -> value`. Object values contribute
/// `key.child` entries and arrays contribute `key.<index>` entries.
pub fn flatten_triples(triples: &[KeyValueTriple]) -> Map<String, Value> {
    let mut out = Map::new();
    for triple in triples {
        flatten_into(&triple.key, &triple.value, &mut out);
    }
    out
}

fn flatten_into(key: &str, value: &Value, out: &mut Map<String, Value>) {
    match value {
        Value::Object(map) => {
            for (child, v) in map {
                flatten_into(&format!("{key}.{child}"), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(&format!("{key}.{i}"), v, out);
            }
        }
        other => {
            out.insert(key.to_string(), other.clone());
        }
    }
}

// -----------------------------------------------------------------------
// Schema suggestion
// -----------------------------------------------------------------------

/// Lowercase snake_case containing only `[a-z0-9_]`.
pub fn sanitize_field_name(key: &str) -> String {
    key.to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

/// `invoice_total-amount` -> `Invoice Total Amount`.
pub fn format_label(key: &str) -> String {
    key.split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn infer_field_type(value: &Value) -> FieldType {
    match value {
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(_) => FieldType::Number,
        Value::String(s) => {
            let s = s.trim();
            if is_date_time(s) {
                FieldType::DateTime
            } else if is_date(s) {
                FieldType::Date
            } else if is_phone_number(s) {
                FieldType::Phone
            } else if is_numeric(s) {
                FieldType::Number
            } else {
                FieldType::Text
            }
        }
        _ => FieldType::Text,
    }
}

/// One field per triple, in reply order. Keys that sanitize to an empty
/// or already-used name are skipped.
pub fn suggest_fields(triples: &[KeyValueTriple]) -> Vec<Field> {
    let mut fields: Vec<Field> = Vec::with_capacity(triples.len());
    for triple in triples {
        let name = sanitize_field_name(&triple.key);
        if name.is_empty() || fields.iter().any(|f| f.name == name) {
            continue;
        }
        fields.push(Field::new(
            name,
            format_label(&triple.key),
            infer_field_type(&triple.value),
        ));
    }
    fields
}

fn is_numeric(s: &str) -> bool {
    let s: String = s.chars().filter(|c| *c != ',' && *c != ' ').collect();
    let digits = s.strip_prefix('-').unwrap_or(&s);
    if digits.is_empty() || digits == "." {
        return false;
    }
    digits.chars().filter(|c| *c == '.').count() <= 1
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
}

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%Y/%m/%d",
    "%b %d, %Y",
    "%d-%b-%Y",
];

const DATE_TIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%SZ",
    "%m/%d/%Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
];

fn is_date(s: &str) -> bool {
    DATE_FORMATS
        .iter()
        .any(|f| NaiveDate::parse_from_str(s, f).is_ok())
}

fn is_date_time(s: &str) -> bool {
    DATE_TIME_FORMATS
        .iter()
        .any(|f| NaiveDateTime::parse_from_str(s, f).is_ok())
}

/// 7 to 15 digits plus at least one separator (`-`, `(`, `)` or space).
fn is_phone_number(s: &str) -> bool {
    let digits = s.chars().filter(char::is_ascii_digit).count();
    (7..=15).contains(&digits) && s.contains(['-', '(', ')', ' '])
}
