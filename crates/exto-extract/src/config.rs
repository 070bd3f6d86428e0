//! Extraction client configuration.

use std::time::Duration;

/// Settings for the extraction model endpoint.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Bearer token for the model provider. Empty disables the client.
    pub api_key: String,
    /// Base URL of the provider API, without a trailing slash.
    pub base_url: String,
    /// Vision model used for template extraction.
    pub model: String,
    /// Text model used for cold-start categorization.
    pub categorization_model: String,
    pub max_tokens: u32,
    pub categorization_max_tokens: u32,
    /// Upper bound on one model round-trip.
    pub request_timeout: Duration,
    /// Characters of document text sent for categorization.
    pub max_text_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            categorization_model: "gpt-4o-mini".into(),
            max_tokens: 2000,
            categorization_max_tokens: 1000,
            request_timeout: Duration::from_secs(120),
            max_text_chars: 24_000,
        }
    }
}

impl ExtractionConfig {
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}
