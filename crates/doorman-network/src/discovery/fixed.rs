use super::{NetworkDiscoverySource, ReachabilityProbe};
use doorman_core::{MacAddress, Result};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Discovery from a fixed MAC → IP table.
///
/// Used for `source = "static"` deployments and as the test double.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscoverySource {
    entries: HashMap<MacAddress, IpAddr>,
}

impl StaticDiscoverySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, mac: MacAddress, ip: IpAddr) -> Self {
        self.entries.insert(mac, ip);
        self
    }
}

impl NetworkDiscoverySource for StaticDiscoverySource {
    async fn lookup(&self, mac: MacAddress) -> Result<Option<IpAddr>> {
        Ok(self.entries.get(&mac).copied())
    }
}

#[derive(Debug, Clone)]
enum Reachable {
    All,
    None,
    Only(HashSet<IpAddr>),
}

/// Probe with canned answers that counts how often it was asked.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    reachable: Reachable,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl StaticProbe {
    /// Every address answers.
    pub fn reachable() -> Self {
        Self::with(Reachable::All)
    }

    /// No address answers.
    pub fn unreachable() -> Self {
        Self::with(Reachable::None)
    }

    /// Only the listed addresses answer.
    pub fn only(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self::with(Reachable::Only(addrs.into_iter().collect()))
    }

    fn with(reachable: Reachable) -> Self {
        Self {
            reachable,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer only after `delay`, like a host that is slow to reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of probes issued so far (shared between clones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReachabilityProbe for StaticProbe {
    async fn probe(&self, addr: IpAddr) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reachable {
            Reachable::All => true,
            Reachable::None => false,
            Reachable::Only(addrs) => addrs.contains(&addr),
        }
    }
}
