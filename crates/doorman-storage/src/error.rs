use thiserror::Error;

/// Storage-specific error types for the doorman access system.
///
/// Access decisions (unknown credential, already inside, ...) travel as
/// [`StorageError::Access`] so callers can tell a denial from a failure.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Access decision denial from the validator or session tracker
    #[error(transparent)]
    Access(#[from] doorman_core::Error),

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Data validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    /// The access denial carried by this error, if any.
    pub fn denial(&self) -> Option<&doorman_core::Error> {
        match self {
            StorageError::Access(err) if err.is_denial() => Some(err),
            _ => None,
        }
    }

    /// Returns true if the error is an access denial rather than a storage failure.
    pub fn is_denial(&self) -> bool {
        self.denial().is_some()
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use doorman_core::Error;

    #[test]
    fn test_denial_classification() {
        let err = StorageError::from(Error::AlreadyInside("ABC12345".into()));
        assert!(err.is_denial());
        assert!(matches!(err.denial(), Some(Error::AlreadyInside(_))));

        let err = StorageError::Validation("bad".into());
        assert!(!err.is_denial());

        let err = StorageError::from(Error::Config("x".into()));
        assert!(!err.is_denial());
    }

    #[test]
    fn test_access_error_is_transparent() {
        let err = StorageError::from(Error::UnknownCredential("TEST1234".into()));
        assert_eq!(err.to_string(), "Unknown credential: TEST1234");
    }
}
