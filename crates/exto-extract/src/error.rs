//! Extraction-layer error types and conversions.

use exto_core::error::ExtoError;

/// Errors raised while talking to the extraction model or reading its reply.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Request to extraction model failed: {0}")]
    Transport(String),

    #[error("Extraction model returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Extraction model returned no content")]
    EmptyReply,

    #[error("Malformed extraction reply: {0}")]
    MalformedReply(String),

    #[error("Failed to build extraction request: {0}")]
    Request(String),

    #[error("Extraction model is not configured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        ExtractError::Transport(err.to_string())
    }
}

impl From<ExtractError> for ExtoError {
    fn from(err: ExtractError) -> Self {
        ExtoError::Extraction(err.to_string())
    }
}

pub type ExtractResult<T> = Result<T, ExtractError>;
