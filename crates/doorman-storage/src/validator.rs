use crate::error::{StorageError, StorageResult};
use crate::repositories::{HolderRepository, SqliteHolderRepository};
use doorman_core::{Credential, Error};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// A credential that passed registry validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCredential {
    pub credential: Credential,

    /// Holder name to show on the scanner
    pub display_name: String,
}

/// Registry check run before every session update.
///
/// # Validation Flow
///
/// 1. **Lookup**: query `holders` by normalized credential
/// 2. **Existence**: deny with `UnknownCredential` if absent
/// 3. **Status**: deny with `InactiveCredential` unless `status = "active"`
///
/// The validator only reads. It keeps no state between calls, so one
/// instance is shared by every listener.
///
/// Denials come back as `Err(StorageError::Access(..))`; database failures
/// as any other `StorageError` variant.
///
/// # Examples
///
/// ```no_run
/// use doorman_core::Credential;
/// use doorman_storage::{CredentialValidator, Database};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let db = Database::in_memory().await?;
/// let validator = CredentialValidator::new(db.pool().clone());
///
/// match validator.validate(&Credential::new("ABC12345")?).await {
///     Ok(valid) => println!("welcome {}", valid.display_name),
///     Err(err) if err.is_denial() => println!("denied: {err}"),
///     Err(err) => return Err(err.into()),
/// }
/// # Ok(())
/// # }
/// ```
pub struct CredentialValidator<R = SqliteHolderRepository> {
    holders: R,
}

impl CredentialValidator<SqliteHolderRepository> {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_repository(SqliteHolderRepository::new(pool))
    }
}

impl<R: HolderRepository> CredentialValidator<R> {
    pub fn with_repository(holders: R) -> Self {
        Self { holders }
    }

    pub async fn validate(&self, credential: &Credential) -> StorageResult<ValidatedCredential> {
        let Some(holder) = self.holders.find_by_credential(credential.as_str()).await? else {
            return Self::deny(Error::UnknownCredential(credential.to_string()));
        };

        if !holder.is_active() {
            return Self::deny(Error::InactiveCredential(credential.to_string()));
        }

        debug!(credential = %credential, holder = %holder.name, "Credential validated");

        Ok(ValidatedCredential {
            credential: credential.clone(),
            display_name: holder.name,
        })
    }

    fn deny(reason: Error) -> StorageResult<ValidatedCredential> {
        info!(reason = %reason, "Credential rejected");
        Err(StorageError::Access(reason))
    }
}
