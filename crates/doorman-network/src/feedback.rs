//! Outcome feedback to scanner displays.
//!
//! For every scan the dispatcher renders the outcome text, delivers it to the
//! device that produced the scan, and schedules the device's idle screen
//! after the display interval. Delivery is best effort: failures are logged
//! and reported as `false`, never retried.
//!
//! # Delivery Paths
//!
//! ```text
//! HttpPush      POST http://{ip}:{port}{path}   text/plain body, any 2xx is success
//! SessionRelay  RelayHub mailbox -> open ingress connection -> device
//! ```

use crate::directory::DeviceDirectory;
use crate::relay::RelayHub;
use doorman_core::constants::{
    DEFAULT_DELIVERY_TIMEOUT_MS, DEFAULT_DISPLAY_INTERVAL_MS, DEFAULT_DISPLAY_PORT,
    DEFAULT_MESSAGE_PATH,
};
use doorman_core::{DeviceRole, Error, MacAddress, Result, ScanOutcome};
use doorman_protocol::DisplayMessages;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How feedback reaches a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryPath {
    /// Plain-text POST to the device's HTTP endpoint
    #[serde(rename = "http")]
    HttpPush,

    /// Written down the device's open ingress connection
    #[serde(rename = "relay")]
    SessionRelay,
}

/// Per-device delivery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTarget {
    pub role: DeviceRole,
    pub path: DeliveryPath,
}

/// Dispatcher timing and endpoint settings.
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// Delay between the outcome message and the idle message
    pub display_interval: Duration,

    /// Bound on one delivery, address discovery included
    pub delivery_timeout: Duration,

    pub http_port: u16,

    pub message_path: String,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            display_interval: Duration::from_millis(DEFAULT_DISPLAY_INTERVAL_MS),
            delivery_timeout: Duration::from_millis(DEFAULT_DELIVERY_TIMEOUT_MS),
            http_port: DEFAULT_DISPLAY_PORT,
            message_path: DEFAULT_MESSAGE_PATH.to_string(),
        }
    }
}

/// Renders and delivers scan feedback.
pub struct FeedbackDispatcher {
    config: FeedbackConfig,
    client: reqwest::Client,
    directory: Arc<DeviceDirectory>,
    relay: Arc<RelayHub>,
    targets: HashMap<MacAddress, DeviceTarget>,
}

impl FeedbackDispatcher {
    /// # Errors
    ///
    /// `Error::Config` if the HTTP client cannot be built.
    pub fn new(
        config: FeedbackConfig,
        directory: Arc<DeviceDirectory>,
        relay: Arc<RelayHub>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.delivery_timeout)
            .http1_only()
            .no_proxy()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            client,
            directory,
            relay,
            targets: HashMap::new(),
        })
    }

    /// Register a device the dispatcher may deliver to.
    pub fn with_target(mut self, mac: MacAddress, role: DeviceRole, path: DeliveryPath) -> Self {
        self.targets.insert(mac, DeviceTarget { role, path });
        self
    }

    pub fn target(&self, mac: MacAddress) -> Option<DeviceTarget> {
        self.targets.get(&mac).copied()
    }

    /// Registered devices, in no particular order.
    pub fn targets(&self) -> impl Iterator<Item = (MacAddress, DeviceTarget)> + '_ {
        self.targets.iter().map(|(mac, target)| (*mac, *target))
    }

    pub fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    /// Show `outcome` on `mac` and schedule its idle screen.
    ///
    /// Returns whether the outcome message was delivered. The idle message
    /// is sent from a spawned task after the display interval either way.
    pub async fn notify(self: &Arc<Self>, mac: MacAddress, outcome: &ScanOutcome) -> bool {
        let text = DisplayMessages::render(outcome.reason, outcome.display_name.as_deref());

        let delivered = match self.send_text(mac, &text).await {
            Ok(()) => {
                info!(mac = %mac, reason = %outcome.reason, "Feedback delivered");
                true
            }
            Err(e) => {
                warn!(mac = %mac, reason = %outcome.reason, error = %e, "Feedback delivery failed");
                false
            }
        };

        self.schedule_idle(mac);
        delivered
    }

    /// Push the idle screen to `mac` now.
    pub async fn announce_idle(&self, mac: MacAddress) -> bool {
        let Some(target) = self.target(mac) else {
            warn!(mac = %mac, "Idle announcement for unregistered device");
            return false;
        };

        match self.send_text(mac, DisplayMessages::idle(target.role)).await {
            Ok(()) => {
                debug!(mac = %mac, role = %target.role, "Idle screen restored");
                true
            }
            Err(e) => {
                warn!(mac = %mac, error = %e, "Idle screen delivery failed");
                false
            }
        }
    }

    fn schedule_idle(self: &Arc<Self>, mac: MacAddress) {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(dispatcher.config.display_interval).await;
            dispatcher.announce_idle(mac).await;
        });
    }

    /// Deliver `text` to `mac` over its configured path.
    ///
    /// # Errors
    ///
    /// - `Error::DeviceUnreachable` for unregistered devices, unresolvable
    ///   addresses, connect failures, non-2xx answers and missing relay sessions
    /// - `Error::DeliveryTimeout` when address discovery and the HTTP
    ///   exchange together exceed the delivery timeout
    pub async fn send_text(&self, mac: MacAddress, text: &str) -> Result<()> {
        let limit = self.config.delivery_timeout;
        match tokio::time::timeout(limit, self.deliver(mac, text)).await {
            Ok(result) => result,
            Err(_) => Err(Error::DeliveryTimeout(limit.as_millis() as u64)),
        }
    }

    async fn deliver(&self, mac: MacAddress, text: &str) -> Result<()> {
        let target = self.target(mac).ok_or_else(|| Error::DeviceUnreachable {
            device: mac.to_string(),
            reason: "device not registered for feedback".to_string(),
        })?;

        match target.path {
            DeliveryPath::HttpPush => self.push_http(mac, target.role, text).await,
            DeliveryPath::SessionRelay => self.relay.deliver(mac, text),
        }
    }

    async fn push_http(&self, mac: MacAddress, role: DeviceRole, text: &str) -> Result<()> {
        let ip = self
            .directory
            .resolve_or_discover(mac, role)
            .await
            .map_err(|e| Error::DeviceUnreachable {
                device: mac.to_string(),
                reason: e.to_string(),
            })?;

        let url = format!(
            "http://{}{}",
            SocketAddr::new(ip, self.config.http_port),
            self.config.message_path
        );
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(text.to_owned())
            .send()
            .await
            .map_err(|e| self.map_http_error(mac, e))?;

        let status = response.status();
        debug!(
            mac = %mac,
            url = %url,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Display message posted"
        );

        if !status.is_success() {
            return Err(Error::DeviceUnreachable {
                device: mac.to_string(),
                reason: format!("display answered {status}"),
            });
        }

        Ok(())
    }

    fn map_http_error(&self, mac: MacAddress, error: reqwest::Error) -> Error {
        if error.is_timeout() {
            Error::DeliveryTimeout(self.config.delivery_timeout.as_millis() as u64)
        } else {
            Error::DeviceUnreachable {
                device: mac.to_string(),
                reason: error.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{DiscoverySource, Probe, StaticDiscoverySource, StaticProbe};
    use doorman_core::{Direction, OutcomeReason};

    fn mac() -> MacAddress {
        "E4:65:B8:27:73:08".parse().unwrap()
    }

    fn dispatcher(path: DeliveryPath) -> (Arc<FeedbackDispatcher>, Arc<RelayHub>) {
        let directory = Arc::new(DeviceDirectory::new(
            DiscoverySource::Static(StaticDiscoverySource::new()),
            Probe::Static(StaticProbe::reachable()),
        ));
        let relay = Arc::new(RelayHub::new());
        let config = FeedbackConfig {
            display_interval: Duration::from_millis(50),
            ..Default::default()
        };

        let dispatcher = FeedbackDispatcher::new(config, directory, relay.clone())
            .unwrap()
            .with_target(mac(), DeviceRole::Entry, path);

        (Arc::new(dispatcher), relay)
    }

    #[tokio::test]
    async fn test_relay_outcome_then_idle() {
        let (dispatcher, relay) = dispatcher(DeliveryPath::SessionRelay);
        let mut session = relay.open(mac());

        let outcome = ScanOutcome::granted(Direction::Entry, "Test User");
        assert!(dispatcher.notify(mac(), &outcome).await);

        assert_eq!(
            session.recv().await.as_deref(),
            Some("Access Granted\nWelcome Test User")
        );
        assert_eq!(
            session.recv().await.as_deref(),
            Some("ENTRY SCANNER\nReady for scan...")
        );
    }

    #[tokio::test]
    async fn test_relay_without_session_fails() {
        let (dispatcher, _relay) = dispatcher(DeliveryPath::SessionRelay);
        let outcome = ScanOutcome::denied(OutcomeReason::DeniedUnregistered, None);

        assert!(!dispatcher.notify(mac(), &outcome).await);
    }

    #[tokio::test]
    async fn test_unregistered_device() {
        let (dispatcher, _relay) = dispatcher(DeliveryPath::HttpPush);
        let other: MacAddress = "00:11:22:33:44:55".parse().unwrap();

        let result = dispatcher.send_text(other, "hello").await;
        assert!(matches!(result, Err(Error::DeviceUnreachable { .. })));
        assert!(!dispatcher.announce_idle(other).await);
    }

    #[tokio::test]
    async fn test_http_device_not_discoverable() {
        let (dispatcher, _relay) = dispatcher(DeliveryPath::HttpPush);

        let result = dispatcher.send_text(mac(), "hello").await;
        assert!(matches!(result, Err(Error::DeviceUnreachable { .. })));
    }
}
