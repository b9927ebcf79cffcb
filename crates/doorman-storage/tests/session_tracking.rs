//! Session tracker behavior against a real database.
//!
//! Run with: cargo test --package doorman-storage --test session_tracking

use doorman_core::{Credential, Direction, Error};
use doorman_storage::{
    AccessEventRepository, Database, DatabaseConfig, SessionTracker, SqliteAccessEventRepository,
    StorageError,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Barrier;

async fn setup_test_db() -> Database {
    Database::in_memory().await.unwrap()
}

fn credential(raw: &str) -> Credential {
    Credential::new(raw).unwrap()
}

#[tokio::test]
async fn test_entry_exit_entry_cycle() {
    let db = setup_test_db().await;
    let tracker = SessionTracker::new(db.pool().clone());
    let c = credential("ABC12345");

    let first = tracker.record(&c, Direction::Entry, None).await.unwrap();
    let exit = tracker.record(&c, Direction::Exit, None).await.unwrap();
    let second = tracker.record(&c, Direction::Entry, None).await.unwrap();

    assert_eq!(exit.seq, first.seq);
    assert!(second.seq > first.seq);
    assert!(second.is_open());
}

#[tokio::test]
async fn test_exit_only_closes_the_visit() {
    let db = setup_test_db().await;
    let tracker = SessionTracker::new(db.pool().clone());
    let c = credential("ABC12345");

    let entry = tracker
        .record(&c, Direction::Entry, Some("Test User"))
        .await
        .unwrap();
    let exit = tracker.record(&c, Direction::Exit, None).await.unwrap();

    assert!(exit.resolved);
    assert!(exit.exit_time.is_some());
    assert_eq!(exit.direction, "entry");
    assert_eq!(exit.event_id, entry.event_id);
    assert_eq!(exit.entry_time, entry.entry_time);
    assert_eq!(exit.holder_name.as_deref(), Some("Test User"));

    let stored = SqliteAccessEventRepository::new(db.pool().clone())
        .find_by_credential("ABC12345", 10)
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get_direction(), Some(Direction::Entry));
    assert!(stored[0].duration().is_some());
}

#[tokio::test]
async fn test_inside_count_matches_unresolved_rows() {
    let db = setup_test_db().await;
    let tracker = SessionTracker::new(db.pool().clone());

    let scans = [
        ("AAA00001", Direction::Entry),
        ("BBB00001", Direction::Entry),
        ("AAA00001", Direction::Exit),
        ("CCC00001", Direction::Entry),
        ("CCC00001", Direction::Entry),
        ("DDD00001", Direction::Exit),
    ];
    for (raw, direction) in scans {
        let _ = tracker.record(&credential(raw), direction, None).await;
    }

    let unresolved: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM access_events WHERE resolved = 0")
            .fetch_one(db.pool())
            .await
            .unwrap();

    assert_eq!(unresolved.0, 2);
    assert_eq!(tracker.inside_count().await.unwrap(), unresolved.0);
}

#[tokio::test]
async fn test_rejected_entry_creates_no_event() {
    let db = setup_test_db().await;
    let tracker = SessionTracker::new(db.pool().clone());
    let events = SqliteAccessEventRepository::new(db.pool().clone());
    let c = credential("ABC12345");

    tracker.record(&c, Direction::Entry, None).await.unwrap();
    let err = tracker.record(&c, Direction::Entry, None).await.unwrap_err();

    assert!(matches!(err, StorageError::Access(Error::AlreadyInside(_))));
    assert_eq!(events.find_recent(10).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_double_entry_single_success() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    let db = Database::new(DatabaseConfig::new(path.to_string_lossy()).max_connections(4))
        .await
        .unwrap();

    let tracker = Arc::new(SessionTracker::new(db.pool().clone()));

    const ATTEMPTS: usize = 8;
    let barrier = Arc::new(Barrier::new(ATTEMPTS));
    let mut handles = vec![];

    for _ in 0..ATTEMPTS {
        let tracker = tracker.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            tracker
                .record(&credential("ABC12345"), Direction::Entry, None)
                .await
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, StorageError::Access(Error::AlreadyInside(_))));
    }

    db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sequence_numbers_unique_across_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seq.db");
    let db = Database::new(DatabaseConfig::new(path.to_string_lossy()).max_connections(4))
        .await
        .unwrap();

    let tracker = Arc::new(SessionTracker::new(db.pool().clone()));

    const HOLDERS: usize = 16;
    let mut handles = vec![];
    for i in 0..HOLDERS {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move {
            let c = credential(&format!("CARD{i:04}"));
            let entry = tracker.record(&c, Direction::Entry, None).await.unwrap();
            let exit = tracker.record(&c, Direction::Exit, None).await.unwrap();
            assert_eq!(entry.seq, exit.seq);
            entry.seq
        }));
    }

    let seqs: Vec<i64> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let unique: HashSet<_> = seqs.iter().copied().collect();
    assert_eq!(unique.len(), HOLDERS);

    let events = SqliteAccessEventRepository::new(db.pool().clone());
    let recent = events.find_recent(HOLDERS as i64).await.unwrap();
    assert!(recent.windows(2).all(|w| w[0].seq > w[1].seq));
    assert_eq!(events.count_open().await.unwrap(), 0);

    db.close().await;
}
