//! Cleanup and parsing of model replies.
//!
//! The model is asked for bare JSON but often wraps it in a Markdown code
//! fence or prefixes a language tag. [`clean_reply`] strips those, then
//! [`parse_key_values`] reads the `keyValues` contract.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::error::{ExtractError, ExtractResult};

/// Strips a leading `json\n` tag and surrounding code-fence markers.
///
/// Already-clean JSON passes through unchanged.
pub fn clean_reply(text: &str) -> &str {
    let text = text.strip_prefix("json\n").unwrap_or(text).trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Narrows `text` to the span between the first `{` and the last `}`.
pub fn json_object_span(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

#[derive(Debug, Deserialize)]
struct KeyValue {
    key: String,
    #[serde(default)]
    value: Value,
    #[serde(rename = "confidenceScore", default)]
    confidence_score: i64,
}

#[derive(Debug, Deserialize)]
struct KeyValuesReply {
    #[serde(rename = "keyValues", default)]
    key_values: Vec<KeyValue>,
}

/// Parsed result of one template extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    /// Extracted values keyed by category field name, passed through untyped.
    pub values: Map<String, Value>,
    /// Confidence score per key.
    pub confidence: BTreeMap<String, i64>,
    /// Mean of `confidence`, 0 when it is empty.
    pub average_confidence: f64,
}

impl ExtractionOutcome {
    /// The payload stored as a record's `raw_data`.
    pub fn raw_data(&self) -> Map<String, Value> {
        let mut raw = Map::new();
        raw.insert("extractedData".into(), Value::Object(self.values.clone()));
        raw.insert("confidenceScores".into(), json!(self.confidence));
        raw.insert("averageConfidence".into(), json!(self.average_confidence));
        raw
    }

    /// Non-empty string value of `field`, if the model returned one.
    pub fn string_value(&self, field: &str) -> Option<&str> {
        self.values
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Arithmetic mean of the scores, 0 for an empty map.
pub fn average_confidence(scores: &BTreeMap<String, i64>) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let sum: i64 = scores.values().sum();
    sum as f64 / scores.len() as f64
}

/// Parses a raw model reply into value and confidence maps.
///
/// Later entries win when the model repeats a key.
pub fn parse_key_values(text: &str) -> ExtractResult<ExtractionOutcome> {
    let cleaned = clean_reply(text);
    let reply: KeyValuesReply =
        serde_json::from_str(cleaned).map_err(|e| ExtractError::MalformedReply(e.to_string()))?;

    let mut values = Map::new();
    let mut confidence = BTreeMap::new();
    for kv in reply.key_values {
        confidence.insert(kv.key.clone(), kv.confidence_score);
        values.insert(kv.key, kv.value);
    }

    let average_confidence = average_confidence(&confidence);
    Ok(ExtractionOutcome {
        values,
        confidence,
        average_confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r#"{"keyValues":[
        {"key":"invoice_no","value":"INV-2024-001","confidenceScore":90},
        {"key":"total","value":125.5,"confidenceScore":70},
        {"key":"line_items","value":[{"description":"Bolts","amount":"12.00"}],"confidenceScore":80}
    ]}"#;

    #[test]
    fn cleanup_strips_fences_and_language_tag() {
        assert_eq!(clean_reply("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(clean_reply("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(clean_reply("json\n  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn cleanup_is_idempotent_on_clean_json() {
        for text in [REPLY.trim(), "{}", "{\"keyValues\":[]}"] {
            assert_eq!(clean_reply(text), text);
            assert_eq!(clean_reply(clean_reply(text)), clean_reply(text));
        }
    }

    #[test]
    fn average_is_the_mean_of_scores() {
        let outcome = parse_key_values(REPLY).unwrap();
        assert_eq!(outcome.average_confidence, 80.0);
        assert_eq!(outcome.confidence["total"], 70);
    }

    #[test]
    fn average_is_zero_without_keys() {
        let outcome = parse_key_values("```json\n{\"keyValues\": []}\n```").unwrap();
        assert!(outcome.values.is_empty());
        assert_eq!(outcome.average_confidence, 0.0);
    }

    #[test]
    fn value_map_keeps_exactly_the_reply_keys() {
        let outcome = parse_key_values(REPLY).unwrap();
        let mut keys: Vec<&str> = outcome.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["invoice_no", "line_items", "total"]);

        let reserialized: Map<String, Value> = serde_json::from_str(
            &serde_json::to_string(&outcome.values).unwrap(),
        )
        .unwrap();
        assert_eq!(reserialized.len(), 3);
        assert!(outcome.values["line_items"].is_array());
    }

    #[test]
    fn malformed_reply_is_an_error() {
        let err = parse_key_values("Sorry, I cannot read this document.").unwrap_err();
        assert!(matches!(err, ExtractError::MalformedReply(_)));
    }

    #[test]
    fn raw_data_carries_values_scores_and_average() {
        let raw = parse_key_values(REPLY).unwrap().raw_data();
        assert_eq!(raw["extractedData"]["invoice_no"], json!("INV-2024-001"));
        assert_eq!(raw["confidenceScores"]["invoice_no"], json!(90));
        assert_eq!(raw["averageConfidence"], json!(80.0));
    }

    #[test]
    fn string_value_ignores_blank_and_non_strings() {
        let outcome = parse_key_values(
            r#"{"keyValues":[{"key":"a","value":"  ","confidenceScore":1},
                             {"key":"b","value":7,"confidenceScore":1}]}"#,
        )
        .unwrap();
        assert_eq!(outcome.string_value("a"), None);
        assert_eq!(outcome.string_value("b"), None);
        assert_eq!(outcome.string_value("missing"), None);
    }

    #[test]
    fn object_span_drops_surrounding_prose() {
        assert_eq!(json_object_span("Here you go: {\"a\":1} done"), "{\"a\":1}");
        assert_eq!(json_object_span("no json"), "no json");
    }
}
