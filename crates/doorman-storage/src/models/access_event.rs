use chrono::{DateTime, Utc};
use doorman_core::{Credential, Direction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One visit in the session log.
///
/// An event is created by a granted entry and stays open (`resolved = false`)
/// until the matching exit attaches `exit_time` and flips `resolved`. Nothing
/// else on the row changes after insertion, so `direction` stays `"entry"`.
///
/// `seq` is assigned by SQLite (`AUTOINCREMENT`), strictly increasing and
/// never reused. It is the only ordering used to pick "the most recent"
/// open entry.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use doorman_core::{Credential, Direction};
/// use doorman_storage::models::AccessEvent;
///
/// let credential = Credential::new("ABC12345").unwrap();
/// let event = AccessEvent::new_entry(&credential, Some("Arun Kumar".into()), Utc::now());
///
/// assert!(event.is_open());
/// assert_eq!(event.get_direction(), Some(Direction::Entry));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessEvent {
    /// Sequence number (0 until persisted)
    pub seq: i64,

    /// Random identifier, stable across exports
    pub event_id: String,

    /// Normalized credential
    pub credential: String,

    /// Holder name captured at entry time
    pub holder_name: Option<String>,

    /// Crossing that opened the row; the tracker only writes `"entry"`
    pub direction: String,

    pub entry_time: DateTime<Utc>,

    pub exit_time: Option<DateTime<Utc>>,

    pub resolved: bool,

    pub created_at: DateTime<Utc>,
}

impl AccessEvent {
    /// Build an open entry event that has not been persisted yet.
    pub fn new_entry(
        credential: &Credential,
        holder_name: Option<String>,
        entry_time: DateTime<Utc>,
    ) -> Self {
        Self {
            seq: 0,
            event_id: Uuid::new_v4().to_string(),
            credential: credential.as_str().to_string(),
            holder_name,
            direction: Direction::Entry.as_str().to_string(),
            entry_time,
            exit_time: None,
            resolved: false,
            created_at: Utc::now(),
        }
    }

    pub fn get_direction(&self) -> Option<Direction> {
        self.direction.parse().ok()
    }

    /// An event is open while its exit has not been recorded.
    pub fn is_open(&self) -> bool {
        !self.resolved
    }

    /// Time spent inside, once resolved.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.exit_time.map(|exit| exit - self.entry_time)
    }
}
