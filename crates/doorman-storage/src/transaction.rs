//! Transaction-aware session log operations.
//!
//! The session tracker runs each check-then-record inside one SQLite
//! transaction. Every function here opens with a write so the transaction
//! takes the database write lock up front and never has to upgrade a read
//! snapshot (which SQLite refuses under WAL when another writer got there
//! first).
//!
//! # Usage Pattern
//!
//! ```no_run
//! use chrono::Utc;
//! use doorman_core::Credential;
//! use doorman_storage::{Database, transaction};
//! use doorman_storage::models::AccessEvent;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::in_memory().await?;
//! let credential = Credential::new("ABC12345")?;
//!
//! let mut tx = db.pool().begin().await?;
//! let event = AccessEvent::new_entry(&credential, None, Utc::now());
//! let inserted = transaction::insert_entry_if_outside(&mut tx, &event).await?;
//! tx.commit().await?;
//!
//! assert!(inserted.is_some());
//! # Ok(())
//! # }
//! ```

use crate::error::StorageResult;
use crate::models::AccessEvent;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

pub(crate) const EVENT_COLUMNS: &str = "seq, event_id, credential, holder_name, direction, \
     entry_time, exit_time, resolved, created_at";

/// Insert `event` unless the credential already has an open entry.
///
/// Returns the persisted event (with its assigned `seq`), or `None` when an
/// open entry exists.
pub async fn insert_entry_if_outside(
    tx: &mut Transaction<'_, Sqlite>,
    event: &AccessEvent,
) -> StorageResult<Option<AccessEvent>> {
    let result = sqlx::query(
        r#"
        INSERT INTO access_events (
            event_id, credential, holder_name, direction,
            entry_time, exit_time, resolved, created_at
        )
        SELECT ?, ?, ?, 'entry', ?, NULL, 0, ?
        WHERE NOT EXISTS (
            SELECT 1 FROM access_events WHERE credential = ? AND resolved = 0
        )
        "#,
    )
    .bind(&event.event_id)
    .bind(&event.credential)
    .bind(&event.holder_name)
    .bind(event.entry_time)
    .bind(event.created_at)
    .bind(&event.credential)
    .execute(&mut **tx)
    .await;

    let result = match result {
        Ok(result) => result,
        // Partial unique index on open entries
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    let inserted = sqlx::query_as::<_, AccessEvent>(&format!(
        "SELECT {EVENT_COLUMNS} FROM access_events WHERE seq = ?"
    ))
    .bind(result.last_insert_rowid())
    .fetch_one(&mut **tx)
    .await?;

    Ok(Some(inserted))
}

/// Resolve the open entry with the highest `seq` for `credential`.
///
/// Only `exit_time` and `resolved` change; the row keeps its entry fields.
/// Returns the updated event, or `None` when nothing is open.
pub async fn resolve_latest_open(
    tx: &mut Transaction<'_, Sqlite>,
    credential: &str,
    exit_time: DateTime<Utc>,
) -> StorageResult<Option<AccessEvent>> {
    let event = sqlx::query_as::<_, AccessEvent>(&format!(
        r#"
        UPDATE access_events
        SET exit_time = ?, resolved = 1
        WHERE seq = (
            SELECT MAX(seq) FROM access_events
            WHERE credential = ? AND resolved = 0
        )
        RETURNING {EVENT_COLUMNS}
        "#
    ))
    .bind(exit_time)
    .bind(credential)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(event)
}
