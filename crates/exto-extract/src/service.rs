//! Template-driven extraction.

use tracing::{debug, info, instrument, warn};

use crate::config::ExtractionConfig;
use crate::error::ExtractResult;
use crate::model::{CompletionModel, CompletionRequest};
use crate::prompt::{DOCUMENT_ATTACHED, TemplateField, extraction_instruction};
use crate::reply::{ExtractionOutcome, parse_key_values};

/// Extracts category fields from a document image.
///
/// One model call per document. Failures are returned to the caller as-is;
/// nothing is retried here.
pub struct ExtractionService<M> {
    model: M,
    config: ExtractionConfig,
}

impl<M: CompletionModel> ExtractionService<M> {
    pub fn new(model: M, config: ExtractionConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Sends the template and the image (a `data:` URL) to the model and
    /// parses the `keyValues` reply.
    #[instrument(skip_all, fields(fields = fields.len()))]
    pub async fn extract(
        &self,
        fields: &[TemplateField],
        image_data_url: &str,
    ) -> ExtractResult<ExtractionOutcome> {
        if fields.is_empty() {
            warn!("Extracting with an empty template");
        }

        let request = CompletionRequest::new(&self.config.model)
            .system(extraction_instruction(fields)?)
            .text(DOCUMENT_ATTACHED)
            .image_url(image_data_url)
            .max_tokens(self.config.max_tokens);

        let reply = self.model.complete(request).await?;
        debug!(reply_chars = reply.len(), "Extraction reply received");

        let outcome = parse_key_values(&reply)?;
        info!(
            keys = outcome.values.len(),
            average_confidence = outcome.average_confidence,
            "Extraction complete"
        );
        Ok(outcome)
    }
}
