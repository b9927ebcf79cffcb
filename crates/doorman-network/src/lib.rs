//! Network layer for doorman.
//!
//! This crate moves scans and feedback between the server and the scanner
//! hardware:
//!
//! - **IngressListener**: accepts scanner connections, acknowledges payloads
//!   and hands scans to a [`ScanHandler`]
//! - **IngressClient**: the scanner side of the same protocol, for tooling
//!   and tests
//! - **DeviceDirectory**: hardware address to network address, learnt from
//!   inbound connections and ARP discovery
//! - **FeedbackDispatcher**: pushes outcome and idle messages to display
//!   units over HTTP or through a [`RelayHub`] session
//!
//! # Example
//!
//! ```no_run
//! use doorman_network::{IngressClient, IngressClientConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = IngressClient::new(IngressClientConfig {
//!     server_addr: "127.0.0.1:8081".parse()?,
//!     timeout: Duration::from_millis(3000),
//! });
//! client.connect().await?;
//! client.send_payload("0009334653;dir=exit").await?;
//! client.recv_ack().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod directory;
pub mod discovery;
mod feedback;
mod listener;
mod listener_state;
mod relay;

pub use client::{IngressClient, IngressClientConfig, IngressClientError, IngressClientResult};
pub use directory::{DeviceDirectory, DeviceRecord, DeviceSource, Observation};
pub use discovery::{DiscoverySource, NetworkDiscoverySource, Probe, ReachabilityProbe};
pub use feedback::{DeliveryPath, DeviceTarget, FeedbackConfig, FeedbackDispatcher};
pub use listener::{
    IngressListener, ListenerConfig, ListenerError, ListenerResult, RejectedScan, ScanHandler,
    ScanRequest,
};
pub use listener_state::{ConnectionStateMachine, ListenerState, StateTransition};
pub use relay::{RelayHub, RelaySession};
