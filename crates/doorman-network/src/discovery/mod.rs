//! Active device discovery.
//!
//! A [`NetworkDiscoverySource`] maps a hardware address to a candidate
//! network address; a [`ReachabilityProbe`] confirms the candidate answers
//! before the directory promotes it.
//!
//! The enums [`DiscoverySource`] and [`Probe`] select an implementation at
//! runtime from configuration.

mod arp;
mod fixed;
mod probe;

pub use arp::{ArpEntry, ArpTableSource, parse_arp_command, parse_proc_net_arp};
pub use fixed::{StaticDiscoverySource, StaticProbe};
pub use probe::{PingProbe, TcpConnectProbe};

use doorman_core::{MacAddress, Result};
use std::future::Future;
use std::net::IpAddr;

/// Source of MAC → IP candidates.
pub trait NetworkDiscoverySource: Send + Sync {
    /// Look up the network address currently associated with `mac`.
    ///
    /// `Ok(None)` means the source was readable but has no entry.
    fn lookup(&self, mac: MacAddress) -> impl Future<Output = Result<Option<IpAddr>>> + Send;
}

/// Single round-trip reachability check.
pub trait ReachabilityProbe: Send + Sync {
    fn probe(&self, addr: IpAddr) -> impl Future<Output = bool> + Send;
}

/// Discovery source selected by configuration.
#[derive(Debug, Clone)]
pub enum DiscoverySource {
    Arp(ArpTableSource),
    Static(StaticDiscoverySource),
}

impl NetworkDiscoverySource for DiscoverySource {
    async fn lookup(&self, mac: MacAddress) -> Result<Option<IpAddr>> {
        match self {
            DiscoverySource::Arp(source) => source.lookup(mac).await,
            DiscoverySource::Static(source) => source.lookup(mac).await,
        }
    }
}

/// Reachability probe selected by configuration.
#[derive(Debug, Clone)]
pub enum Probe {
    Ping(PingProbe),
    TcpConnect(TcpConnectProbe),
    Static(StaticProbe),
    /// Trust the candidate without probing
    Skip,
}

impl ReachabilityProbe for Probe {
    async fn probe(&self, addr: IpAddr) -> bool {
        match self {
            Probe::Ping(probe) => probe.probe(addr).await,
            Probe::TcpConnect(probe) => probe.probe(addr).await,
            Probe::Static(probe) => probe.probe(addr).await,
            Probe::Skip => true,
        }
    }
}
