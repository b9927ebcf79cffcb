//! Entry/exit session tracking.
//!
//! [`SessionTracker::record`] is the only writer of the session log. It
//! holds a per-credential async lock for the duration of one check-then-record
//! and runs the database side inside a single transaction, so two scans of the
//! same credential can never both observe "outside" and both enter.
//!
//! Scans for different credentials take different locks and proceed in
//! parallel. The lock never covers network I/O: feedback is dispatched by the
//! caller after `record` returns.

use crate::error::{StorageError, StorageResult};
use crate::models::AccessEvent;
use crate::transaction;
use chrono::Utc;
use doorman_core::{Credential, Direction, Error};
use parking_lot::Mutex;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

type CredentialLock = Arc<tokio::sync::Mutex<()>>;

/// Session state machine over the persisted log.
pub struct SessionTracker {
    pool: SqlitePool,
    locks: Mutex<HashMap<Credential, CredentialLock>>,
}

impl SessionTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Record a crossing for `credential`.
    ///
    /// - `Entry` succeeds iff no open entry exists, appending a new open event.
    /// - `Exit` succeeds iff an open entry exists, resolving the one with the
    ///   highest `seq`.
    ///
    /// # Errors
    ///
    /// `StorageError::Access(AlreadyInside)` or `StorageError::Access(NoOpenEntry)`
    /// for illegal transitions; other variants for database failures.
    pub async fn record(
        &self,
        credential: &Credential,
        direction: Direction,
        holder_name: Option<&str>,
    ) -> StorageResult<AccessEvent> {
        let lock = self.lock_for(credential);

        let result = {
            let _guard = lock.lock().await;
            self.record_locked(credential, direction, holder_name).await
        };

        drop(lock);
        self.release(credential);

        result
    }

    async fn record_locked(
        &self,
        credential: &Credential,
        direction: Direction,
        holder_name: Option<&str>,
    ) -> StorageResult<AccessEvent> {
        let mut tx = self.pool.begin().await?;

        let event = match direction {
            Direction::Entry => {
                let event =
                    AccessEvent::new_entry(credential, holder_name.map(str::to_owned), Utc::now());
                transaction::insert_entry_if_outside(&mut tx, &event)
                    .await?
                    .ok_or_else(|| Error::AlreadyInside(credential.to_string()))
            }
            Direction::Exit => {
                transaction::resolve_latest_open(&mut tx, credential.as_str(), Utc::now())
                    .await?
                    .ok_or_else(|| Error::NoOpenEntry(credential.to_string()))
            }
        };

        match event {
            Ok(event) => {
                tx.commit().await?;
                info!(
                    credential = %credential,
                    direction = %direction,
                    seq = event.seq,
                    "Session event recorded"
                );
                Ok(event)
            }
            Err(reason) => {
                tx.rollback().await?;
                info!(
                    credential = %credential,
                    direction = %direction,
                    reason = %reason,
                    "Session transition rejected"
                );
                Err(StorageError::Access(reason))
            }
        }
    }

    /// Number of credentials currently inside.
    pub async fn inside_count(&self) -> StorageResult<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM access_events WHERE resolved = 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }

    fn lock_for(&self, credential: &Credential) -> CredentialLock {
        self.locks
            .lock()
            .entry(credential.clone())
            .or_default()
            .clone()
    }

    /// Drop the table slot once no other task holds or waits on it.
    fn release(&self, credential: &Credential) {
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(credential)
            && Arc::strong_count(lock) == 1
        {
            locks.remove(credential);
            debug!(credential = %credential, "Released credential lock slot");
        }
    }

    #[cfg(test)]
    fn lock_slots(&self) -> usize {
        self.locks.lock().len()
    }
}
