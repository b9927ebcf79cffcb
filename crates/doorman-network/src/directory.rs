//! Device directory: hardware address → network address.
//!
//! Display units get their addresses from DHCP, so the server only knows
//! them by MAC. The directory learns addresses two ways:
//!
//! - **Observed**: every inbound scan connection reports its peer address
//!   ([`DeviceDirectory::observe`]). Last writer wins.
//! - **Discovered**: on demand, a [`NetworkDiscoverySource`] proposes a
//!   candidate and a [`ReachabilityProbe`] must confirm it before it is
//!   promoted ([`DeviceDirectory::discover`]).
//!
//! Records are only ever superseded, never removed.
//!
//! # Example
//!
//! ```
//! use doorman_network::DeviceDirectory;
//! use doorman_network::discovery::{StaticDiscoverySource, StaticProbe};
//!
//! let directory = DeviceDirectory::with_discovery(
//!     StaticDiscoverySource::new(),
//!     StaticProbe::reachable(),
//! );
//! let mac = "E4:65:B8:27:73:08".parse().unwrap();
//!
//! directory.observe(mac, "192.168.1.23".parse().unwrap());
//! assert_eq!(directory.resolve(mac), Some("192.168.1.23".parse().unwrap()));
//! ```

use crate::discovery::{
    DiscoverySource, NetworkDiscoverySource, Probe, ReachabilityProbe,
};
use chrono::{DateTime, Utc};
use doorman_core::{DeviceRole, Error, MacAddress, Result};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::IpAddr;
use tracing::{debug, info, warn};

/// How a device address was learnt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceSource {
    Observed,
    Discovered,
    Static,
}

/// Last known location of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRecord {
    pub hardware_address: MacAddress,
    pub network_address: IpAddr,
    pub last_seen: DateTime<Utc>,
    pub role: Option<DeviceRole>,
    pub source: DeviceSource,
}

/// What an [`observe`](DeviceDirectory::observe) call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First address ever seen for this device
    New,
    /// Same address as before
    Unchanged,
    /// Device reappeared from a different address
    Moved { previous: IpAddr },
}

/// Shared MAC → IP directory.
///
/// All reads and writes take the map lock for O(1) work only; discovery I/O
/// runs outside it.
pub struct DeviceDirectory<S = DiscoverySource, P = Probe> {
    records: RwLock<HashMap<MacAddress, DeviceRecord>>,
    source: S,
    probe: P,
}

impl DeviceDirectory {
    pub fn new(source: DiscoverySource, probe: Probe) -> Self {
        Self::with_discovery(source, probe)
    }
}

impl<S: NetworkDiscoverySource, P: ReachabilityProbe> DeviceDirectory<S, P> {
    pub fn with_discovery(source: S, probe: P) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            source,
            probe,
        }
    }

    /// Current network address for `mac`, if known.
    pub fn resolve(&self, mac: MacAddress) -> Option<IpAddr> {
        self.records.read().get(&mac).map(|r| r.network_address)
    }

    /// Full record for `mac`, if known.
    pub fn get(&self, mac: MacAddress) -> Option<DeviceRecord> {
        self.records.read().get(&mac).cloned()
    }

    /// Record that `mac` was just seen at `ip`.
    ///
    /// Overwrites the address unconditionally. A changed address is logged
    /// as a warning since it usually means a DHCP lease moved.
    pub fn observe(&self, mac: MacAddress, ip: IpAddr) -> Observation {
        let now = Utc::now();
        let observation = match self.records.write().entry(mac) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                let previous = record.network_address;
                record.network_address = ip;
                record.last_seen = now;
                record.source = DeviceSource::Observed;

                if previous == ip {
                    Observation::Unchanged
                } else {
                    Observation::Moved { previous }
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(DeviceRecord {
                    hardware_address: mac,
                    network_address: ip,
                    last_seen: now,
                    role: None,
                    source: DeviceSource::Observed,
                });
                Observation::New
            }
        };

        match observation {
            Observation::New => info!(mac = %mac, ip = %ip, "Device observed"),
            Observation::Moved { previous } => {
                warn!(mac = %mac, previous = %previous, ip = %ip, "Device address changed")
            }
            Observation::Unchanged => debug!(mac = %mac, ip = %ip, "Device seen"),
        }

        observation
    }

    /// Pin a configured address for `mac`.
    pub fn insert_static(&self, mac: MacAddress, ip: IpAddr, role: DeviceRole) {
        self.records.write().insert(
            mac,
            DeviceRecord {
                hardware_address: mac,
                network_address: ip,
                last_seen: Utc::now(),
                role: Some(role),
                source: DeviceSource::Static,
            },
        );
        info!(mac = %mac, ip = %ip, role = %role, "Static device address registered");
    }

    /// Look `mac` up through the discovery source and promote it if the probe answers.
    ///
    /// # Errors
    ///
    /// `Error::DiscoveryFailed` when the source fails, has no entry, or the
    /// candidate does not answer. Existing records are left untouched in
    /// every failure case.
    pub async fn discover(&self, mac: MacAddress, role: DeviceRole) -> Result<IpAddr> {
        let started = Utc::now();

        let candidate = self
            .source
            .lookup(mac)
            .await
            .map_err(|e| match e {
                Error::DiscoveryFailed(_) => e,
                other => Error::DiscoveryFailed(other.to_string()),
            })?
            .ok_or_else(|| {
                Error::DiscoveryFailed(format!("{mac} not present in the neighbour table"))
            })?;

        if !self.probe.probe(candidate).await {
            warn!(mac = %mac, candidate = %candidate, "Discovered address did not answer probe");
            return Err(Error::DiscoveryFailed(format!(
                "{mac} at {candidate} did not answer probe"
            )));
        }

        let mut records = self.records.write();

        // An inbound connection observed while probing is fresher than the table
        if let Some(record) = records.get_mut(&mac)
            && record.source == DeviceSource::Observed
            && record.last_seen >= started
        {
            record.role.get_or_insert(role);
            return Ok(record.network_address);
        }

        records.insert(
            mac,
            DeviceRecord {
                hardware_address: mac,
                network_address: candidate,
                last_seen: Utc::now(),
                role: Some(role),
                source: DeviceSource::Discovered,
            },
        );
        drop(records);

        info!(mac = %mac, ip = %candidate, role = %role, "Device discovered");
        Ok(candidate)
    }

    /// Directory hit, or discovery on a miss.
    pub async fn resolve_or_discover(&self, mac: MacAddress, role: DeviceRole) -> Result<IpAddr> {
        match self.resolve(mac) {
            Some(ip) => Ok(ip),
            None => self.discover(mac, role).await,
        }
    }

    /// Snapshot of every record, ordered by hardware address.
    pub fn records(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by_key(|r| r.hardware_address);
        records
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{StaticDiscoverySource, StaticProbe};

    fn mac() -> MacAddress {
        "E4:65:B8:27:73:08".parse().unwrap()
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn directory(
        source: StaticDiscoverySource,
        probe: StaticProbe,
    ) -> DeviceDirectory<StaticDiscoverySource, StaticProbe> {
        DeviceDirectory::with_discovery(source, probe)
    }

    #[test]
    fn test_observe_last_writer_wins() {
        let dir = directory(StaticDiscoverySource::new(), StaticProbe::reachable());

        assert_eq!(dir.observe(mac(), ip("10.0.0.5")), Observation::New);
        assert_eq!(dir.observe(mac(), ip("10.0.0.5")), Observation::Unchanged);
        assert_eq!(
            dir.observe(mac(), ip("10.0.0.9")),
            Observation::Moved {
                previous: ip("10.0.0.5")
            }
        );

        assert_eq!(dir.resolve(mac()), Some(ip("10.0.0.9")));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_observe_keeps_role() {
        let dir = directory(StaticDiscoverySource::new(), StaticProbe::reachable());
        dir.insert_static(mac(), ip("10.0.0.5"), DeviceRole::Exit);
        dir.observe(mac(), ip("10.0.0.6"));

        let record = dir.get(mac()).unwrap();
        assert_eq!(record.role, Some(DeviceRole::Exit));
        assert_eq!(record.source, DeviceSource::Observed);
    }

    #[tokio::test]
    async fn test_discover_promotes_reachable_candidate() {
        let probe = StaticProbe::reachable();
        let dir = directory(
            StaticDiscoverySource::new().with_entry(mac(), ip("192.168.1.23")),
            probe.clone(),
        );

        let found = dir.discover(mac(), DeviceRole::Entry).await.unwrap();
        assert_eq!(found, ip("192.168.1.23"));
        assert_eq!(probe.calls(), 1);

        let record = dir.get(mac()).unwrap();
        assert_eq!(record.source, DeviceSource::Discovered);
        assert_eq!(record.role, Some(DeviceRole::Entry));
    }

    #[tokio::test]
    async fn test_failed_probe_leaves_record_untouched() {
        let dir = directory(
            StaticDiscoverySource::new().with_entry(mac(), ip("192.168.1.99")),
            StaticProbe::unreachable(),
        );
        dir.observe(mac(), ip("192.168.1.23"));

        let result = dir.discover(mac(), DeviceRole::Entry).await;
        assert!(matches!(result, Err(Error::DiscoveryFailed(_))));
        assert_eq!(dir.resolve(mac()), Some(ip("192.168.1.23")));
    }

    #[tokio::test]
    async fn test_discover_absent_mac() {
        let probe = StaticProbe::reachable();
        let dir = directory(StaticDiscoverySource::new(), probe.clone());

        let result = dir.discover(mac(), DeviceRole::Exit).await;
        assert!(matches!(result, Err(Error::DiscoveryFailed(_))));
        assert_eq!(probe.calls(), 0);
        assert!(dir.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_or_discover_prefers_directory() {
        let probe = StaticProbe::reachable();
        let dir = directory(
            StaticDiscoverySource::new().with_entry(mac(), ip("192.168.1.99")),
            probe.clone(),
        );
        dir.observe(mac(), ip("192.168.1.23"));

        let found = dir.resolve_or_discover(mac(), DeviceRole::Entry).await.unwrap();
        assert_eq!(found, ip("192.168.1.23"));
        assert_eq!(probe.calls(), 0);
    }

    #[test]
    fn test_records_sorted() {
        let dir = directory(StaticDiscoverySource::new(), StaticProbe::reachable());
        let a: MacAddress = "00:00:00:00:00:02".parse().unwrap();
        let b: MacAddress = "00:00:00:00:00:01".parse().unwrap();
        dir.observe(a, ip("10.0.0.2"));
        dir.observe(b, ip("10.0.0.1"));

        let macs: Vec<_> = dir.records().iter().map(|r| r.hardware_address).collect();
        assert_eq!(macs, vec![b, a]);
    }
}
