//! End-to-end access decisions through the pipeline
//!
//! Feedback goes over the relay path so each test can read exactly what the
//! scanner's display would have shown.

use doorman_core::{
    Credential, DeviceRole, Direction, Error, MacAddress, OutcomeReason, ScanOutcome,
};
use doorman_network::discovery::{StaticDiscoverySource, StaticProbe};
use doorman_network::{
    DeliveryPath, DeviceDirectory, DiscoverySource, FeedbackConfig, FeedbackDispatcher, Probe,
    RejectedScan, RelayHub, RelaySession, ScanHandler, ScanRequest,
};
use doorman_protocol::ScanPayload;
use doorman_server::AccessPipeline;
use doorman_storage::{
    AccessEventRepository, CredentialHolder, Database, HolderRepository, HolderStatus,
    SqliteAccessEventRepository, SqliteHolderRepository,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const ENTRY_MAC: &str = "E4:65:B8:27:73:08";
const EXIT_MAC: &str = "E0:5A:1B:A2:A5:B4";

struct Fixture {
    database: Database,
    pipeline: AccessPipeline,
    relay: Arc<RelayHub>,
}

impl Fixture {
    async fn new() -> Self {
        let database = Database::in_memory().await.unwrap();
        let holders = SqliteHolderRepository::new(database.pool().clone());
        let credential = Credential::new("ABC12345").unwrap();
        holders
            .create(&CredentialHolder::new("Test User", &credential))
            .await
            .unwrap();

        let directory = Arc::new(DeviceDirectory::new(
            DiscoverySource::Static(StaticDiscoverySource::new()),
            Probe::Static(StaticProbe::unreachable()),
        ));
        let relay = Arc::new(RelayHub::new());
        let config = FeedbackConfig {
            display_interval: Duration::from_millis(50),
            ..Default::default()
        };
        let dispatcher = FeedbackDispatcher::new(config, directory, Arc::clone(&relay))
            .unwrap()
            .with_target(mac(ENTRY_MAC), DeviceRole::Entry, DeliveryPath::SessionRelay)
            .with_target(mac(EXIT_MAC), DeviceRole::Exit, DeliveryPath::SessionRelay);

        let pipeline = AccessPipeline::new(database.pool().clone(), Arc::new(dispatcher));

        Self {
            database,
            pipeline,
            relay,
        }
    }

    fn events(&self) -> SqliteAccessEventRepository {
        SqliteAccessEventRepository::new(self.database.pool().clone())
    }

    /// Run one scan from `device`, returning the outcome and the session
    /// that received its feedback.
    async fn scan(&self, device: &str, raw: &str) -> (ScanOutcome, RelaySession) {
        let session = self.relay.open(mac(device));
        let outcome = self.pipeline.process(&request(device, raw)).await;
        (outcome, session)
    }
}

fn request(device: &str, raw: &str) -> ScanRequest {
    let device = mac(device);
    let role = if device == mac(ENTRY_MAC) {
        DeviceRole::Entry
    } else {
        DeviceRole::Exit
    };

    ScanRequest {
        payload: ScanPayload::new(Credential::new(raw).unwrap()),
        device,
        direction: role.direction(),
        role,
        peer: "127.0.0.1:40000".parse().unwrap(),
    }
}

fn mac(s: &str) -> MacAddress {
    s.parse().unwrap()
}

async fn next_message(session: &mut RelaySession) -> String {
    timeout(Duration::from_secs(2), session.recv())
        .await
        .expect("No feedback relayed")
        .expect("Relay session closed")
}

#[tokio::test]
async fn test_unregistered_card_denied_without_event() {
    let fixture = Fixture::new().await;

    let (outcome, mut session) = fixture.scan(ENTRY_MAC, "TEST1234").await;
    assert!(!outcome.accepted);
    assert_eq!(outcome.reason, OutcomeReason::DeniedUnregistered);
    assert_eq!(
        next_message(&mut session).await,
        "Access Denied\nNot Registered"
    );

    assert!(fixture.events().find_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreadable_card_denied_without_event() {
    let fixture = Fixture::new().await;
    let mut session = fixture.relay.open(mac(ENTRY_MAC));

    let rejection = RejectedScan {
        device: mac(ENTRY_MAC),
        role: DeviceRole::Entry,
        peer: "127.0.0.1:40000".parse().unwrap(),
        error: Error::InvalidCredential("0009334".into()),
    };
    let outcome = fixture.pipeline.reject(&rejection).await;

    assert!(!outcome.accepted);
    assert_eq!(outcome.reason, OutcomeReason::DeniedUnregistered);
    assert_eq!(
        next_message(&mut session).await,
        "Access Denied\nNot Registered"
    );
    assert_eq!(
        next_message(&mut session).await,
        "ENTRY SCANNER\nReady for scan..."
    );
    assert!(fixture.events().find_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_announced_device_gets_idle_screen() {
    let fixture = Fixture::new().await;
    let mut session = fixture.relay.open(mac(EXIT_MAC));

    fixture
        .pipeline
        .device_announced(mac(EXIT_MAC), DeviceRole::Exit)
        .await;

    assert_eq!(
        next_message(&mut session).await,
        "EXIT SCANNER\nReady for scan..."
    );
}

#[tokio::test]
async fn test_entry_then_idle_screen() {
    let fixture = Fixture::new().await;

    let (outcome, mut session) = fixture.scan(ENTRY_MAC, "abc12345").await;
    assert!(outcome.accepted);
    assert_eq!(outcome.reason, OutcomeReason::GrantedEntry);
    assert_eq!(outcome.display_name.as_deref(), Some("Test User"));

    assert_eq!(
        next_message(&mut session).await,
        "Access Granted\nWelcome Test User"
    );
    assert_eq!(
        next_message(&mut session).await,
        "ENTRY SCANNER\nReady for scan..."
    );

    let events = fixture.events().find_recent(10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].credential, "ABC12345");
    assert!(events[0].is_open());
}

#[tokio::test]
async fn test_repeat_entry_denied() {
    let fixture = Fixture::new().await;

    let (first, mut session) = fixture.scan(ENTRY_MAC, "ABC12345").await;
    assert!(first.accepted);
    next_message(&mut session).await;
    next_message(&mut session).await;

    let (second, mut session) = fixture.scan(ENTRY_MAC, "ABC12345").await;
    assert_eq!(second.reason, OutcomeReason::DeniedAlreadyInside);
    assert_eq!(
        next_message(&mut session).await,
        "Access Denied\nAlready Inside"
    );

    assert_eq!(fixture.events().count_open().await.unwrap(), 1);
    assert_eq!(fixture.events().find_recent(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_exit_closes_visit() {
    let fixture = Fixture::new().await;

    fixture.scan(ENTRY_MAC, "ABC12345").await;
    let (outcome, mut session) = fixture.scan(EXIT_MAC, "ABC12345").await;

    assert_eq!(outcome.reason, OutcomeReason::GrantedExit);
    assert_eq!(
        next_message(&mut session).await,
        "Exit Granted\nDoor Opened\nGoodbye Test User"
    );
    assert_eq!(
        next_message(&mut session).await,
        "EXIT SCANNER\nReady for scan..."
    );

    let events = fixture.events().find_recent(10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].resolved);
    assert!(events[0].exit_time.is_some());
    assert_eq!(fixture.pipeline.tracker().inside_count().await.unwrap(), 0);

    // A second visit starts a fresh row
    let (again, _session) = fixture.scan(ENTRY_MAC, "ABC12345").await;
    assert!(again.accepted);
    assert_eq!(fixture.events().find_recent(10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_exit_without_entry_denied() {
    let fixture = Fixture::new().await;

    let (outcome, mut session) = fixture.scan(EXIT_MAC, "ABC12345").await;
    assert_eq!(outcome.reason, OutcomeReason::DeniedNoOpenEntry);
    assert_eq!(
        next_message(&mut session).await,
        "No Entry Found\nAccess Denied\nTest User"
    );
    assert!(fixture.events().find_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_inactive_holder_denied() {
    let fixture = Fixture::new().await;
    SqliteHolderRepository::new(fixture.database.pool().clone())
        .update_status("ABC12345", HolderStatus::Inactive)
        .await
        .unwrap();

    let (outcome, mut session) = fixture.scan(ENTRY_MAC, "ABC12345").await;
    assert_eq!(outcome.reason, OutcomeReason::DeniedInactive);
    assert_eq!(
        next_message(&mut session).await,
        "Access Denied\nInactive Card"
    );
    assert!(fixture.events().find_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_decision_stands_without_display() {
    let fixture = Fixture::new().await;

    // No relay session is open, so feedback delivery fails
    let outcome = fixture.pipeline.process(&request(ENTRY_MAC, "ABC12345")).await;
    assert!(outcome.accepted);
    assert_eq!(fixture.events().count_open().await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_entries_record_once() {
    let fixture = Arc::new(Fixture::new().await);
    let credential = Credential::new("ABC12345").unwrap();

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let fixture = Arc::clone(&fixture);
        let credential = credential.clone();
        tasks.push(tokio::spawn(async move {
            fixture.pipeline.decide(&credential, Direction::Entry).await
        }));
    }

    let mut granted = 0;
    for task in tasks {
        if task.await.unwrap().accepted {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
    assert_eq!(fixture.events().count_open().await.unwrap(), 1);
}
