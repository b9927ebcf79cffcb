#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::AccessEvent;
use crate::transaction::{self, EVENT_COLUMNS};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Repository trait for the session log.
///
/// Events are append-only from the core's point of view: an entry inserts a
/// row and an exit resolves it. Nothing here deletes.
pub trait AccessEventRepository: Send + Sync {
    /// Append an open entry. Returns `None` if the credential already has one.
    async fn append_entry(&self, event: &AccessEvent) -> StorageResult<Option<AccessEvent>>;

    /// Open entry for `credential` with the highest `seq`
    async fn find_open_entry(&self, credential: &str) -> StorageResult<Option<AccessEvent>>;

    /// Resolve the open entry with the highest `seq`, returning it updated
    async fn resolve_open_entry(
        &self,
        credential: &str,
        exit_time: DateTime<Utc>,
    ) -> StorageResult<Option<AccessEvent>>;

    /// Number of unresolved entries (holders currently inside)
    async fn count_open(&self) -> StorageResult<i64>;

    /// Most recent events first, by `seq`
    async fn find_recent(&self, limit: i64) -> StorageResult<Vec<AccessEvent>>;

    /// Events for one credential, most recent first
    async fn find_by_credential(&self, credential: &str, limit: i64)
    -> StorageResult<Vec<AccessEvent>>;

    /// Entries recorded at or after `since`
    async fn count_entries_since(&self, since: DateTime<Utc>) -> StorageResult<i64>;

    /// Exits recorded at or after `since`
    async fn count_exits_since(&self, since: DateTime<Utc>) -> StorageResult<i64>;
}

/// SQLite implementation of AccessEventRepository
pub struct SqliteAccessEventRepository {
    pool: SqlitePool,
}

impl SqliteAccessEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AccessEventRepository for SqliteAccessEventRepository {
    async fn append_entry(&self, event: &AccessEvent) -> StorageResult<Option<AccessEvent>> {
        let mut tx = self.pool.begin().await?;
        let inserted = transaction::insert_entry_if_outside(&mut tx, event).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn find_open_entry(&self, credential: &str) -> StorageResult<Option<AccessEvent>> {
        let event = sqlx::query_as::<_, AccessEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM access_events
            WHERE credential = ? AND resolved = 0
            ORDER BY seq DESC
            LIMIT 1
            "#
        ))
        .bind(credential)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn resolve_open_entry(
        &self,
        credential: &str,
        exit_time: DateTime<Utc>,
    ) -> StorageResult<Option<AccessEvent>> {
        let mut tx = self.pool.begin().await?;
        let resolved = transaction::resolve_latest_open(&mut tx, credential, exit_time).await?;
        tx.commit().await?;
        Ok(resolved)
    }

    async fn count_open(&self) -> StorageResult<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM access_events WHERE resolved = 0")
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }

    async fn find_recent(&self, limit: i64) -> StorageResult<Vec<AccessEvent>> {
        let events = sqlx::query_as::<_, AccessEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM access_events ORDER BY seq DESC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn find_by_credential(
        &self,
        credential: &str,
        limit: i64,
    ) -> StorageResult<Vec<AccessEvent>> {
        let events = sqlx::query_as::<_, AccessEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM access_events
            WHERE credential = ?
            ORDER BY seq DESC
            LIMIT ?
            "#
        ))
        .bind(credential)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn count_entries_since(&self, since: DateTime<Utc>) -> StorageResult<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM access_events WHERE entry_time >= ?")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }

    async fn count_exits_since(&self, since: DateTime<Utc>) -> StorageResult<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM access_events WHERE exit_time IS NOT NULL AND exit_time >= ?",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}
