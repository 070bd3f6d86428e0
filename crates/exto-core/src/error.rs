//! Error types for the Exto system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtoError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Tenant context missing or invalid")]
    TenantContext,

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Payment provider error: {0}")]
    Payment(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtoError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// True for errors caused by the caller's input (4xx-equivalent).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::AlreadyExists { .. }
                | Self::Validation { .. }
                | Self::TenantContext
        )
    }
}

pub type ExtoResult<T> = Result<T, ExtoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_distinguished_from_backend_failures() {
        assert!(ExtoError::not_found("category", "x").is_client_error());
        assert!(ExtoError::validation("bad").is_client_error());
        assert!(ExtoError::TenantContext.is_client_error());
        assert!(!ExtoError::Extraction("timeout".into()).is_client_error());
        assert!(!ExtoError::Database("down".into()).is_client_error());
    }
}
