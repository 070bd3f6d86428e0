//! Instruction building for template-driven extraction.

use exto_core::models::format::Format;
use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, ExtractResult};

/// Text part sent alongside the document image.
pub const DOCUMENT_ATTACHED: &str = "The document image is attached below.";

/// One field the model is asked to extract, taken from a format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateField {
    pub category_field_name: String,
    pub prompt_text: String,
    pub sample_values: Vec<String>,
}

/// Flattens the extraction fields of every format, in order. Fields that
/// appear in more than one format are kept once per format.
pub fn template_fields(formats: &[Format]) -> Vec<TemplateField> {
    formats
        .iter()
        .flat_map(|format| format.extraction_fields.iter())
        .map(|field| TemplateField {
            category_field_name: field.category_field_name.clone(),
            prompt_text: field.prompt.text.clone(),
            sample_values: field.prompt.sample_values.clone(),
        })
        .collect()
}

/// Builds the system instruction for a template extraction.
pub fn extraction_instruction(fields: &[TemplateField]) -> ExtractResult<String> {
    let template = serde_json::to_string_pretty(fields)
        .map_err(|e| ExtractError::Request(format!("template fields: {e}")))?;

    Ok(format!(
        r#"
You are an intelligent document data extraction system.

You will be provided with:
1. An image of a document.
2. A list of template fields (JSON):
{template}

Each template field contains:
- category_field_name: the key under which the extracted value is stored (snake_case).
- prompt_text: a description of what to extract.
- sample_values: example values that guide extraction.

Extract data **only** for the fields defined in the template. Do not invent fields that are not in the template.

Output JSON with exactly this structure:

{{
  "keyValues": [
    {{
      "key": "<category_field_name from template>",
      "value": "<extracted value>",
      "confidenceScore": <integer from 1 to 100>
    }}
  ]
}}

Confidence score guidelines:
- Text clarity: is the value legible and free of artifacts?
- Structural correctness: does the value follow the expected format (dates, currency)?
- Pattern consistency: does the value match the sample values or domain patterns?
- Recognition confidence: use internal uncertainty where available.

Return only JSON. Do not include explanations or additional text.
"#
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use exto_core::models::format::{ExtractionField, ExtractionPrompt};
    use uuid::Uuid;

    fn format(fields: &[(&str, &str)]) -> Format {
        Format {
            id: Uuid::new_v4(),
            name: "layout".into(),
            category_id: Uuid::new_v4(),
            is_active: true,
            extraction_fields: fields
                .iter()
                .map(|(name, text)| ExtractionField {
                    name: name.to_string(),
                    category_field_name: name.to_string(),
                    prompt: ExtractionPrompt {
                        text: text.to_string(),
                        sample_values: vec!["S-1".into()],
                        images: Vec::new(),
                    },
                })
                .collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn fields_are_flattened_across_formats_without_dedup() {
        let formats = vec![
            format(&[("invoice_no", "number at top"), ("total", "grand total")]),
            format(&[("invoice_no", "number at bottom")]),
        ];
        let fields = template_fields(&formats);
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2].category_field_name, "invoice_no");
        assert_eq!(fields[2].prompt_text, "number at bottom");
    }

    #[test]
    fn instruction_embeds_template_and_contract() {
        let fields = template_fields(&[format(&[("invoice_no", "number at top")])]);
        let text = extraction_instruction(&fields).unwrap();
        assert!(text.contains("\"category_field_name\": \"invoice_no\""));
        assert!(text.contains("\"keyValues\""));
        assert!(text.contains("\"confidenceScore\""));
    }
}
