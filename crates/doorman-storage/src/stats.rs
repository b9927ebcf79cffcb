use crate::error::StorageResult;
use crate::repositories::{
    AccessEventRepository, HolderRepository, SqliteAccessEventRepository, SqliteHolderRepository,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

/// Occupancy snapshot for the operator surface.
///
/// Every figure is derived from the log at call time; nothing is cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OccupancyStats {
    pub total_holders: i64,
    pub inside_count: i64,
    pub outside_count: i64,
    pub today_entries: i64,
    pub today_exits: i64,
}

impl OccupancyStats {
    /// Compute the snapshot, counting today's crossings from midnight UTC.
    pub async fn collect(pool: &SqlitePool) -> StorageResult<Self> {
        Self::collect_since(pool, start_of_day(Utc::now())).await
    }

    pub async fn collect_since(pool: &SqlitePool, since: DateTime<Utc>) -> StorageResult<Self> {
        let holders = SqliteHolderRepository::new(pool.clone());
        let events = SqliteAccessEventRepository::new(pool.clone());

        let total_holders = holders.count().await?;
        let inside_count = events.count_open().await?;

        Ok(Self {
            total_holders,
            inside_count,
            outside_count: (total_holders - inside_count).max(0),
            today_entries: events.count_entries_since(since).await?,
            today_exits: events.count_exits_since(since).await?,
        })
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use crate::models::CredentialHolder;
    use crate::session::SessionTracker;
    use chrono::TimeZone;
    use doorman_core::{Credential, Direction};

    #[test]
    fn test_start_of_day() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 17, 42, 9).unwrap();
        assert_eq!(
            start_of_day(now),
            Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_collect() {
        let db = Database::in_memory().await.unwrap();
        let holders = SqliteHolderRepository::new(db.pool().clone());
        let tracker = SessionTracker::new(db.pool().clone());

        for (name, raw) in [("Arun", "AAA00001"), ("Bala", "BBB00001"), ("Chitra", "CCC00001")] {
            let credential = Credential::new(raw).unwrap();
            holders
                .create(&CredentialHolder::new(name, &credential))
                .await
                .unwrap();
        }

        let a = Credential::new("AAA00001").unwrap();
        let b = Credential::new("BBB00001").unwrap();
        tracker.record(&a, Direction::Entry, None).await.unwrap();
        tracker.record(&b, Direction::Entry, None).await.unwrap();
        tracker.record(&b, Direction::Exit, None).await.unwrap();

        let stats = OccupancyStats::collect(db.pool()).await.unwrap();
        assert_eq!(
            stats,
            OccupancyStats {
                total_holders: 3,
                inside_count: 1,
                outside_count: 2,
                today_entries: 2,
                today_exits: 1,
            }
        );
    }
}
