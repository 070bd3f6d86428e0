//! Database-specific error types and conversions.

use std::time::Duration;

use exto_core::error::ExtoError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Invalid stored value: {0}")]
    Decode(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
}

impl DbError {
    fn message(&self) -> String {
        match self {
            DbError::Surreal(e) => e.to_string(),
            DbError::Query(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    /// True when the storage engine aborted the statement because a
    /// concurrent transaction touched the same record.
    pub fn is_retryable(&self) -> bool {
        let msg = self.message().to_ascii_lowercase();
        msg.contains("conflict") || msg.contains("can be retried")
    }

    /// True when the statement read a table that has not been defined.
    /// Tenant tables are created on first write.
    pub fn is_missing_table(&self) -> bool {
        let msg = self.message();
        msg.contains("table") && msg.contains("does not exist")
    }

    /// Name of the unique index rejecting a write, if that is the cause.
    pub fn unique_violation(&self) -> Option<String> {
        let msg = self.message();
        if !msg.contains("already contains") {
            return None;
        }
        let index = msg
            .split('`')
            .nth(1)
            .map(str::to_string)
            .unwrap_or_else(|| "record".to_string());
        Some(index)
    }
}

impl From<DbError> for ExtoError {
    fn from(err: DbError) -> Self {
        if let Some(index) = err.unique_violation() {
            return ExtoError::AlreadyExists { entity: index };
        }
        match err {
            DbError::NotFound { entity, id } => ExtoError::NotFound { entity, id },
            other => ExtoError::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_index_violation_maps_to_already_exists() {
        let err = DbError::Query(
            "Database index `idx_identity_email` already contains 'a@b.c', \
             with record `identity:x`"
                .into(),
        );
        assert_eq!(err.unique_violation().as_deref(), Some("idx_identity_email"));
        match ExtoError::from(err) {
            ExtoError::AlreadyExists { entity } => assert_eq!(entity, "idx_identity_email"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn conflicts_are_retryable() {
        let err = DbError::Query(
            "Failed to commit transaction due to a read or write conflict. \
             This transaction can be retried"
                .into(),
        );
        assert!(err.is_retryable());
        assert!(!DbError::Decode("bad uuid".into()).is_retryable());
    }

    #[test]
    fn undefined_table_is_recognised() {
        let err = DbError::Query("The table 'sc_globex__batch' does not exist".into());
        assert!(err.is_missing_table());
        assert!(!DbError::Query("Parse error".into()).is_missing_table());
    }

    #[test]
    fn not_found_keeps_entity() {
        let err = DbError::NotFound {
            entity: "batch".into(),
            id: "42".into(),
        };
        assert!(matches!(ExtoError::from(err), ExtoError::NotFound { .. }));
    }
}
