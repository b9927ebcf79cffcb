//! Integration tests for HTTP feedback delivery
//!
//! A minimal display unit is emulated with a raw TCP listener that parses one
//! HTTP/1.1 request per connection and records the method, path and body.

use doorman_core::{DeviceRole, Direction, Error, MacAddress, OutcomeReason, ScanOutcome};
use doorman_network::discovery::{StaticDiscoverySource, StaticProbe};
use doorman_network::{
    DeliveryPath, DeviceDirectory, DiscoverySource, FeedbackConfig, FeedbackDispatcher, Probe,
    RelayHub,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const DISPLAY_MAC: &str = "E4:65:B8:27:73:08";

#[derive(Debug)]
struct Captured {
    request_line: String,
    content_type: Option<String>,
    body: String,
}

enum DisplayBehavior {
    Respond(&'static str),
    Silent,
}

/// Spawn a mock display unit, returning its port and the captured requests.
async fn mock_display(behavior: DisplayBehavior) -> (u16, mpsc::UnboundedReceiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let tx = tx.clone();
            let status = match behavior {
                DisplayBehavior::Respond(status) => Some(status),
                DisplayBehavior::Silent => None,
            };
            tokio::spawn(serve_one(stream, status, tx));
        }
    });

    (port, rx)
}

async fn serve_one(
    mut stream: TcpStream,
    status: Option<&'static str>,
    tx: mpsc::UnboundedSender<Captured>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();

    let mut content_length = 0;
    let mut content_type = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.to_string());
            }
        }
    }

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = String::from_utf8_lossy(&buf[header_end..]).into_owned();
    let _ = tx.send(Captured {
        request_line,
        content_type,
        body,
    });

    match status {
        Some(status) => {
            let response =
                format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            let _ = stream.write_all(response.as_bytes()).await;
        }
        None => {
            // Hold the connection open without answering
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }
}

fn dispatcher(port: u16, interval: Duration) -> Arc<FeedbackDispatcher> {
    let mac: MacAddress = DISPLAY_MAC.parse().unwrap();
    let directory = Arc::new(DeviceDirectory::new(
        DiscoverySource::Static(StaticDiscoverySource::new()),
        Probe::Static(StaticProbe::reachable()),
    ));
    directory.insert_static(mac, IpAddr::V4(Ipv4Addr::LOCALHOST), DeviceRole::Entry);

    let config = FeedbackConfig {
        display_interval: interval,
        delivery_timeout: Duration::from_millis(300),
        http_port: port,
        ..Default::default()
    };

    Arc::new(
        FeedbackDispatcher::new(config, directory, Arc::new(RelayHub::new()))
            .unwrap()
            .with_target(mac, DeviceRole::Entry, DeliveryPath::HttpPush),
    )
}

async fn next_request(rx: &mut mpsc::UnboundedReceiver<Captured>) -> Captured {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("Display received nothing")
        .unwrap()
}

#[tokio::test]
async fn test_outcome_posted_as_plain_text() {
    let (port, mut requests) = mock_display(DisplayBehavior::Respond("200 OK")).await;
    let dispatcher = dispatcher(port, Duration::from_millis(100));

    let outcome = ScanOutcome::granted(Direction::Entry, "Test User");
    assert!(dispatcher.notify(DISPLAY_MAC.parse().unwrap(), &outcome).await);

    let request = next_request(&mut requests).await;
    assert_eq!(request.request_line, "POST /message HTTP/1.1");
    assert_eq!(request.content_type.as_deref(), Some("text/plain"));
    assert_eq!(request.body, "Access Granted\nWelcome Test User");
}

#[tokio::test]
async fn test_idle_message_follows_outcome() {
    let (port, mut requests) = mock_display(DisplayBehavior::Respond("200 OK")).await;
    let dispatcher = dispatcher(port, Duration::from_millis(100));

    let outcome = ScanOutcome::denied(OutcomeReason::DeniedUnregistered, None);
    dispatcher.notify(DISPLAY_MAC.parse().unwrap(), &outcome).await;

    assert_eq!(
        next_request(&mut requests).await.body,
        "Access Denied\nNot Registered"
    );
    assert_eq!(
        next_request(&mut requests).await.body,
        "ENTRY SCANNER\nReady for scan..."
    );
}

#[tokio::test]
async fn test_any_2xx_is_success() {
    let (port, _requests) = mock_display(DisplayBehavior::Respond("204 No Content")).await;
    let dispatcher = dispatcher(port, Duration::from_secs(60));

    dispatcher
        .send_text(DISPLAY_MAC.parse().unwrap(), "hello")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_status_is_unreachable() {
    let (port, _requests) =
        mock_display(DisplayBehavior::Respond("500 Internal Server Error")).await;
    let dispatcher = dispatcher(port, Duration::from_secs(60));

    let result = dispatcher.send_text(DISPLAY_MAC.parse().unwrap(), "hello").await;
    assert!(matches!(result, Err(Error::DeviceUnreachable { .. })));
}

#[tokio::test]
async fn test_refused_connection_is_unreachable() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let dispatcher = dispatcher(port, Duration::from_secs(60));

    let outcome = ScanOutcome::granted(Direction::Entry, "Test User");
    assert!(!dispatcher.notify(DISPLAY_MAC.parse().unwrap(), &outcome).await);

    let result = dispatcher.send_text(DISPLAY_MAC.parse().unwrap(), "hello").await;
    assert!(matches!(result, Err(Error::DeviceUnreachable { .. })));
}

#[tokio::test]
async fn test_silent_display_times_out() {
    let (port, _requests) = mock_display(DisplayBehavior::Silent).await;
    let dispatcher = dispatcher(port, Duration::from_secs(60));

    let result = dispatcher.send_text(DISPLAY_MAC.parse().unwrap(), "hello").await;
    assert!(matches!(result, Err(Error::DeliveryTimeout(300))));
}

#[tokio::test]
async fn test_slow_discovery_counts_against_delivery_timeout() {
    let (port, _requests) = mock_display(DisplayBehavior::Respond("200 OK")).await;
    let mac: MacAddress = DISPLAY_MAC.parse().unwrap();

    // Directory is empty, so delivery has to discover and confirm the address first
    let directory = Arc::new(DeviceDirectory::new(
        DiscoverySource::Static(
            StaticDiscoverySource::new().with_entry(mac, IpAddr::V4(Ipv4Addr::LOCALHOST)),
        ),
        Probe::Static(StaticProbe::reachable().with_delay(Duration::from_secs(2))),
    ));
    let config = FeedbackConfig {
        delivery_timeout: Duration::from_millis(300),
        http_port: port,
        ..Default::default()
    };
    let dispatcher = FeedbackDispatcher::new(config, directory, Arc::new(RelayHub::new()))
        .unwrap()
        .with_target(mac, DeviceRole::Entry, DeliveryPath::HttpPush);

    let result = timeout(Duration::from_secs(1), dispatcher.send_text(mac, "hello"))
        .await
        .expect("Delivery outlived its timeout");
    assert!(matches!(result, Err(Error::DeliveryTimeout(300))));
}
