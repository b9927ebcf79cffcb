#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::{CredentialHolder, HolderStatus};
use sqlx::SqlitePool;

/// Repository trait for the credential registry.
///
/// The access pipeline only ever reads through [`find_by_credential`]; the
/// remaining operations back the operator CLI and config seeding.
///
/// [`find_by_credential`]: HolderRepository::find_by_credential
pub trait HolderRepository: Send + Sync {
    /// Find a holder by normalized credential
    async fn find_by_credential(&self, credential: &str) -> StorageResult<Option<CredentialHolder>>;

    /// Create a new holder, returning its ID
    async fn create(&self, holder: &CredentialHolder) -> StorageResult<i64>;

    /// Insert the holder, or refresh name and contact details if the credential exists.
    ///
    /// Status is only set on insert so a seed never reactivates a holder.
    async fn upsert(&self, holder: &CredentialHolder) -> StorageResult<()>;

    /// Change a holder's status
    async fn update_status(&self, credential: &str, status: HolderStatus) -> StorageResult<()>;

    /// Delete a holder by credential
    async fn delete(&self, credential: &str) -> StorageResult<()>;

    /// All holders ordered by name
    async fn list(&self) -> StorageResult<Vec<CredentialHolder>>;

    /// Total number of registered holders
    async fn count(&self) -> StorageResult<i64>;
}

/// SQLite implementation of HolderRepository
pub struct SqliteHolderRepository {
    pool: SqlitePool,
}

impl SqliteHolderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn not_found(credential: &str) -> StorageError {
        StorageError::NotFound {
            entity_type: "CredentialHolder".to_string(),
            field: "credential".to_string(),
            value: credential.to_string(),
        }
    }
}

impl HolderRepository for SqliteHolderRepository {
    async fn find_by_credential(&self, credential: &str) -> StorageResult<Option<CredentialHolder>> {
        let holder = sqlx::query_as::<_, CredentialHolder>(
            r#"
            SELECT id, name, credential, email, phone, status, created_at
            FROM holders
            WHERE credential = ?
            "#,
        )
        .bind(credential)
        .fetch_optional(&self.pool)
        .await?;

        Ok(holder)
    }

    async fn create(&self, holder: &CredentialHolder) -> StorageResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO holders (name, credential, email, phone, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&holder.name)
        .bind(&holder.credential)
        .bind(&holder.email)
        .bind(&holder.phone)
        .bind(holder.status().as_str())
        .bind(holder.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) => Ok(result.last_insert_rowid()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                StorageError::Validation(format!("Credential {} already registered", holder.credential)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, holder: &CredentialHolder) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO holders (name, credential, email, phone, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(credential) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                phone = excluded.phone
            "#,
        )
        .bind(&holder.name)
        .bind(&holder.credential)
        .bind(&holder.email)
        .bind(&holder.phone)
        .bind(holder.status().as_str())
        .bind(holder.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_status(&self, credential: &str, status: HolderStatus) -> StorageResult<()> {
        let result = sqlx::query("UPDATE holders SET status = ? WHERE credential = ?")
            .bind(status.as_str())
            .bind(credential)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(credential));
        }

        Ok(())
    }

    async fn delete(&self, credential: &str) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM holders WHERE credential = ?")
            .bind(credential)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Self::not_found(credential));
        }

        Ok(())
    }

    async fn list(&self) -> StorageResult<Vec<CredentialHolder>> {
        let holders = sqlx::query_as::<_, CredentialHolder>(
            r#"
            SELECT id, name, credential, email, phone, status, created_at
            FROM holders
            ORDER BY name, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(holders)
    }

    async fn count(&self) -> StorageResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM holders")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}
