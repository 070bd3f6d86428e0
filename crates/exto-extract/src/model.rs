//! The seam between extraction logic and a concrete model provider.

use crate::error::ExtractResult;

/// One part of a multimodal user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// An image passed by URL, usually a `data:image/...;base64,` URL.
    ImageUrl(String),
    /// A whole file passed inline, e.g. a PDF as a `data:` URL.
    File { filename: String, data_url: String },
}

/// A single-turn request: optional system instruction plus one user message.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub user: Vec<ContentPart>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            user: Vec::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn system(mut self, text: impl Into<String>) -> Self {
        self.system = Some(text.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.user.push(ContentPart::Text(text.into()));
        self
    }

    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.user.push(ContentPart::ImageUrl(url.into()));
        self
    }

    pub fn file(mut self, filename: impl Into<String>, data_url: impl Into<String>) -> Self {
        self.user.push(ContentPart::File {
            filename: filename.into(),
            data_url: data_url.into(),
        });
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// True when the request carries an inline file part.
    pub fn has_file(&self) -> bool {
        self.user
            .iter()
            .any(|part| matches!(part, ContentPart::File { .. }))
    }
}

/// Sends a prompt plus payload to a model and returns the reply text.
pub trait CompletionModel: Send + Sync {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = ExtractResult<String>> + Send;
}

impl<M: CompletionModel> CompletionModel for std::sync::Arc<M> {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl Future<Output = ExtractResult<String>> + Send {
        (**self).complete(request)
    }
}
