//! Configuration loading from TOML files
//!
//! The file is selected with `--config <path>` (default `config/doorman.toml`).
//! Every section is optional except `[[devices]]`; missing keys fall back to
//! the defaults in `doorman_core::constants`.
//!
//! ```toml
//! log_level = "info"
//!
//! [database]
//! path = "doorman.db"
//!
//! [feedback]
//! display_interval_ms = 3000
//!
//! [discovery]
//! source = "arp"
//! probe = "ping"
//!
//! [[devices]]
//! role = "entry"
//! mac = "E4:65:B8:27:73:08"
//!
//! [[holders]]
//! credential = "ABC12345"
//! name = "Test User"
//! ```

use anyhow::{Context, bail, ensure};
use doorman_core::constants::{
    DEFAULT_DELIVERY_TIMEOUT_MS, DEFAULT_DISPLAY_INTERVAL_MS, DEFAULT_DISPLAY_PORT,
    DEFAULT_MESSAGE_PATH, DEFAULT_PAYLOAD_GAP_MS, DEFAULT_PROBE_TIMEOUT_MS,
    DEFAULT_READ_TIMEOUT_MS, DEFAULT_RELAY_LINGER_MS, DEFAULT_SHUTDOWN_GRACE_MS,
    MAX_DISPLAY_INTERVAL_MS, MIN_DISPLAY_INTERVAL_MS,
};
use doorman_core::{Credential, DeviceRole, MacAddress};
use doorman_network::discovery::{
    ArpTableSource, PingProbe, StaticDiscoverySource, TcpConnectProbe,
};
use doorman_network::{DeliveryPath, DiscoverySource, FeedbackConfig, ListenerConfig, Probe};
use doorman_storage::{CredentialHolder, DatabaseConfig, HolderStatus};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/doorman.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Log filter used when `RUST_LOG` is not set
    #[serde(default)]
    pub log_level: Option<String>,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub feedback: FeedbackSettings,

    #[serde(default)]
    pub discovery: DiscoverySettings,

    #[serde(default)]
    pub ingress: IngressSettings,

    #[serde(default)]
    pub devices: Vec<DeviceSettings>,

    /// Registry entries inserted or refreshed at startup
    #[serde(default)]
    pub holders: Vec<HolderSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_database_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_path() -> String {
    "doorman.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackSettings {
    #[serde(default = "default_display_interval_ms")]
    pub display_interval_ms: u64,

    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_message_path")]
    pub message_path: String,
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            display_interval_ms: default_display_interval_ms(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            http_port: default_http_port(),
            message_path: default_message_path(),
        }
    }
}

fn default_display_interval_ms() -> u64 {
    DEFAULT_DISPLAY_INTERVAL_MS
}

fn default_delivery_timeout_ms() -> u64 {
    DEFAULT_DELIVERY_TIMEOUT_MS
}

fn default_http_port() -> u16 {
    DEFAULT_DISPLAY_PORT
}

fn default_message_path() -> String {
    DEFAULT_MESSAGE_PATH.to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryKind {
    /// Host ARP cache
    #[default]
    Arp,
    /// Only the `address` values configured on devices
    Static,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    #[default]
    Ping,
    Tcp,
    None,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySettings {
    #[serde(default)]
    pub source: DiscoveryKind,

    #[serde(default)]
    pub probe: ProbeKind,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            source: DiscoveryKind::default(),
            probe: ProbeKind::default(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngressSettings {
    /// Interface the listeners bind to
    #[serde(default = "default_bind_host")]
    pub bind_host: IpAddr,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_payload_gap_ms")]
    pub payload_gap_ms: u64,

    #[serde(default = "default_relay_linger_ms")]
    pub relay_linger_ms: u64,

    /// Time given to in-flight scans on shutdown before they are aborted
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for IngressSettings {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            read_timeout_ms: default_read_timeout_ms(),
            payload_gap_ms: default_payload_gap_ms(),
            relay_linger_ms: default_relay_linger_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

fn default_bind_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_read_timeout_ms() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

fn default_payload_gap_ms() -> u64 {
    DEFAULT_PAYLOAD_GAP_MS
}

fn default_relay_linger_ms() -> u64 {
    DEFAULT_RELAY_LINGER_MS
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

/// One scanner and its display unit.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSettings {
    pub role: DeviceRole,

    pub mac: MacAddress,

    /// Listener port; defaults to 8080 for entry and 8081 for exit
    #[serde(default)]
    pub listen_port: Option<u16>,

    #[serde(default = "default_delivery")]
    pub delivery: DeliveryPath,

    /// Fixed network address, skipping discovery
    #[serde(default)]
    pub address: Option<IpAddr>,
}

impl DeviceSettings {
    pub fn listen_port(&self) -> u16 {
        self.listen_port.unwrap_or_else(|| self.role.default_port())
    }
}

fn default_delivery() -> DeliveryPath {
    DeliveryPath::HttpPush
}

#[derive(Debug, Clone, Deserialize)]
pub struct HolderSeed {
    pub credential: String,

    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl HolderSeed {
    /// Registry row for this seed.
    pub fn to_holder(&self) -> anyhow::Result<CredentialHolder> {
        let credential = Credential::new(&self.credential)
            .with_context(|| format!("Invalid seed credential {:?}", self.credential))?;

        let status = if self.active {
            HolderStatus::Active
        } else {
            HolderStatus::Inactive
        };

        let mut holder = CredentialHolder::new(self.name.trim(), &credential).with_status(status);
        if let Some(email) = &self.email {
            holder = holder.with_email(email);
        }
        if let Some(phone) = &self.phone {
            holder = holder.with_phone(phone);
        }
        Ok(holder)
    }
}

impl Config {
    /// Read, parse and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to load config file {}", path.display()))
    }

    /// Parse and validate configuration text.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let interval = self.feedback.display_interval_ms;
        ensure!(
            (MIN_DISPLAY_INTERVAL_MS..=MAX_DISPLAY_INTERVAL_MS).contains(&interval),
            "feedback.display_interval_ms must be within {MIN_DISPLAY_INTERVAL_MS}..={MAX_DISPLAY_INTERVAL_MS}, got {interval}"
        );
        ensure!(
            self.feedback.delivery_timeout_ms > 0,
            "feedback.delivery_timeout_ms must be positive"
        );
        ensure!(
            self.feedback.message_path.starts_with('/'),
            "feedback.message_path must start with '/'"
        );
        ensure!(
            self.database.max_connections > 0,
            "database.max_connections must be positive"
        );
        ensure!(
            self.ingress.payload_gap_ms > 0 && self.ingress.read_timeout_ms > 0,
            "ingress timeouts must be positive"
        );
        ensure!(
            self.ingress.shutdown_grace_ms > 0,
            "ingress.shutdown_grace_ms must be positive"
        );

        if self.devices.is_empty() {
            bail!("No [[devices]] configured");
        }

        let mut macs = HashSet::new();
        let mut ports = HashSet::new();
        for device in &self.devices {
            ensure!(macs.insert(device.mac), "Device {} configured twice", device.mac);
            ensure!(
                ports.insert(device.listen_port()),
                "Listen port {} used by more than one device",
                device.listen_port()
            );

            if device.delivery == DeliveryPath::SessionRelay {
                ensure!(
                    self.ingress.relay_linger_ms > interval,
                    "ingress.relay_linger_ms must exceed the display interval for relay device {}",
                    device.mac
                );
            }
        }

        let mut credentials = HashSet::new();
        for seed in &self.holders {
            let holder = seed.to_holder()?;
            ensure!(
                !holder.name.is_empty(),
                "Holder {} has an empty name",
                holder.credential
            );
            ensure!(
                credentials.insert(holder.credential.clone()),
                "Holder {} seeded twice",
                holder.credential
            );
        }

        Ok(())
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(&self.database.path)
            .max_connections(self.database.max_connections)
            .min_connections(1)
            .auto_migrate(true)
    }

    pub fn feedback_config(&self) -> FeedbackConfig {
        FeedbackConfig {
            display_interval: Duration::from_millis(self.feedback.display_interval_ms),
            delivery_timeout: Duration::from_millis(self.feedback.delivery_timeout_ms),
            http_port: self.feedback.http_port,
            message_path: self.feedback.message_path.clone(),
        }
    }

    pub fn listener_config(&self, device: &DeviceSettings) -> ListenerConfig {
        ListenerConfig::new(
            SocketAddr::new(self.ingress.bind_host, device.listen_port()),
            device.role,
            device.mac,
        )
        .with_delivery(device.delivery)
        .with_read_timeout(Duration::from_millis(self.ingress.read_timeout_ms))
        .with_payload_gap(Duration::from_millis(self.ingress.payload_gap_ms))
        .with_relay_linger(Duration::from_millis(self.ingress.relay_linger_ms))
        .with_shutdown_grace(Duration::from_millis(self.ingress.shutdown_grace_ms))
    }

    pub fn discovery_source(&self) -> DiscoverySource {
        match self.discovery.source {
            DiscoveryKind::Arp => DiscoverySource::Arp(
                ArpTableSource::new().with_command_timeout(self.probe_timeout()),
            ),
            DiscoveryKind::Static => DiscoverySource::Static(self.devices.iter().fold(
                StaticDiscoverySource::new(),
                |source, device| match device.address {
                    Some(ip) => source.with_entry(device.mac, ip),
                    None => source,
                },
            )),
        }
    }

    pub fn probe(&self) -> Probe {
        match self.discovery.probe {
            ProbeKind::Ping => Probe::Ping(PingProbe::new(self.probe_timeout())),
            ProbeKind::Tcp => Probe::TcpConnect(TcpConnectProbe::new(
                self.feedback.http_port,
                self.probe_timeout(),
            )),
            ProbeKind::None => Probe::Skip,
        }
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery.probe_timeout_ms)
    }
}
