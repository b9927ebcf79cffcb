//! Full server: config in, scanner traffic over TCP, feedback out

use doorman_network::{IngressClient, IngressClientConfig};
use doorman_server::{Config, Server};
use doorman_storage::{AccessEventRepository, SqliteAccessEventRepository};
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn config(dir: &TempDir) -> Config {
    let text = format!(
        r#"
        [database]
        path = "{db}"

        [discovery]
        source = "static"
        probe = "none"

        [ingress]
        bind_host = "127.0.0.1"
        payload_gap_ms = 50

        [[devices]]
        role = "entry"
        mac = "E4:65:B8:27:73:08"
        delivery = "relay"
        listen_port = {entry}

        [[devices]]
        role = "exit"
        mac = "E0:5A:1B:A2:A5:B4"
        delivery = "relay"
        listen_port = {exit}

        [[holders]]
        credential = "ABC12345"
        name = "Test User"
        "#,
        db = dir.path().join("doorman.db").display(),
        entry = free_port().await,
        exit = free_port().await,
    );
    Config::parse(&text).unwrap()
}

async fn scan(addr: SocketAddr, payload: &str) -> Option<String> {
    let mut client = IngressClient::new(IngressClientConfig {
        server_addr: addr,
        timeout: Duration::from_secs(2),
    });
    client.connect().await.unwrap();
    client.send_payload(payload).await.unwrap();
    client.recv_ack().await.unwrap();
    let message = client.recv_relay().await.unwrap();
    client.close().await.unwrap();
    message
}

#[tokio::test]
async fn test_entry_and_exit_through_listeners() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir).await;

    let server = Server::build(&config).await.unwrap();
    let addrs = server.listener_addrs();
    assert_eq!(addrs.len(), 2);
    let pool = server.database().pool().clone();

    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(server.run(shutdown_rx));

    assert_eq!(
        scan(addrs[0], "abc12345").await.as_deref(),
        Some("Access Granted\nWelcome Test User")
    );
    assert_eq!(
        scan(addrs[0], "TEST1234").await.as_deref(),
        Some("Access Denied\nNot Registered")
    );
    assert_eq!(
        scan(addrs[1], "ABC12345").await.as_deref(),
        Some("Exit Granted\nDoor Opened\nGoodbye Test User")
    );

    let events = SqliteAccessEventRepository::new(pool)
        .find_recent(10)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].resolved);

    shutdown.send(true).unwrap();
    timeout(Duration::from_secs(5), task)
        .await
        .expect("Server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_port_in_use_fails_build() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir).await;

    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    config.devices[0].listen_port = Some(taken.local_addr().unwrap().port());

    assert!(Server::build(&config).await.is_err());
}
