//! Scan-layer error types.

use exto_core::error::ExtoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("file system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("spreadsheet write failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("sheet {0} exceeds the worksheet size limit")]
    SheetTooLarge(String),

    #[error("no free upload path for {0}")]
    PathExhausted(String),

    #[error("payment provider returned status {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("payment provider request failed: {0}")]
    ProviderTransport(String),

    #[error("payment provider is not configured")]
    ProviderNotConfigured,
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        ScanError::ProviderTransport(err.to_string())
    }
}

impl From<ScanError> for ExtoError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Image(_) => ExtoError::validation(err.to_string()),
            ScanError::Io(_)
            | ScanError::Xlsx(_)
            | ScanError::SheetTooLarge(_)
            | ScanError::PathExhausted(_) => ExtoError::Storage(err.to_string()),
            ScanError::Provider { .. }
            | ScanError::ProviderTransport(_)
            | ScanError::ProviderNotConfigured => ExtoError::Payment(err.to_string()),
        }
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
