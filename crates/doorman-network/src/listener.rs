//! TCP ingress listener for scanner payloads.
//!
//! One listener runs per scanner role. Each accepted connection carries a
//! single scan: the listener reads the payload, acknowledges it with `OK`
//! and hands it to a [`ScanHandler`] on its own task, so the acknowledgment
//! never waits for the access decision.
//!
//! Payloads that cannot be parsed are acknowledged too and handed to
//! [`ScanHandler::reject`], so the scanner still shows a denial. A keep-alive
//! from a device the directory has not seen before goes to
//! [`ScanHandler::device_announced`].
//!
//! # Architecture
//!
//! ```text
//! entry scanner ──TCP :8080──> IngressListener(Entry) ─┐
//!                                                      ├──> ScanHandler (spawned per scan)
//! exit scanner  ──TCP :8081──> IngressListener(Exit)  ─┘
//!                                   │
//!                                   ├──> DeviceDirectory::observe(mac, peer ip)
//!                                   └──> RelayHub session (relay devices only)
//! ```
//!
//! # Payload Boundaries
//!
//! A payload ends at `\n`, at EOF, or when the link has been quiet for the
//! payload gap with bytes buffered. The last case covers scanner firmware
//! that writes the bare credential and then blocks waiting for the ack.
//!
//! # Example
//!
//! ```no_run
//! use doorman_network::{
//!     DeviceDirectory, DiscoverySource, IngressListener, ListenerConfig, Probe, RelayHub,
//!     ScanHandler, ScanRequest,
//! };
//! use doorman_network::discovery::{ArpTableSource, PingProbe};
//! use doorman_core::DeviceRole;
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! struct PrintHandler;
//!
//! impl ScanHandler for PrintHandler {
//!     async fn handle(&self, request: ScanRequest) {
//!         println!("{} {}", request.payload.credential, request.direction);
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ListenerConfig::new(
//!     "0.0.0.0:8080".parse()?,
//!     DeviceRole::Entry,
//!     "E4:65:B8:27:73:08".parse()?,
//! );
//! let directory = Arc::new(DeviceDirectory::new(
//!     DiscoverySource::Arp(ArpTableSource::new()),
//!     Probe::Ping(PingProbe::default()),
//! ));
//! let relay = Arc::new(RelayHub::new());
//!
//! let listener = IngressListener::bind(config, Arc::new(PrintHandler), directory, relay).await?;
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//! listener.run(shutdown_rx).await?;
//! # Ok(())
//! # }
//! ```

use crate::directory::{DeviceDirectory, Observation};
use crate::feedback::DeliveryPath;
use crate::listener_state::{ConnectionStateMachine, ListenerState};
use crate::relay::{RelayHub, RelaySession};
use doorman_core::constants::{
    DEFAULT_PAYLOAD_GAP_MS, DEFAULT_READ_TIMEOUT_MS, DEFAULT_RELAY_LINGER_MS,
    DEFAULT_SHUTDOWN_GRACE_MS, MAX_PAYLOAD_SIZE,
};
use doorman_core::{DeviceRole, Direction, MacAddress};
use doorman_protocol::{IngressCodec, IngressFrame, IngressReply, ScanPayload};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::codec::{Decoder, Framed};
use tracing::{debug, info, trace, warn};

/// Settings for one ingress listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Address to accept scanner connections on
    pub bind_addr: SocketAddr,

    /// Role of the scanner served by this listener
    pub role: DeviceRole,

    /// Hardware address assumed when a payload carries no `mac` tag
    pub device_mac: MacAddress,

    /// How the scanner receives feedback
    pub delivery: DeliveryPath,

    /// Bound on reading one payload
    pub read_timeout: Duration,

    /// Quiet period that ends an unterminated payload
    pub payload_gap: Duration,

    /// How long relay connections stay open after the ack
    pub relay_linger: Duration,

    pub max_payload_size: usize,

    /// How long `run` waits for in-flight connections after shutdown
    pub shutdown_grace: Duration,
}

impl ListenerConfig {
    pub fn new(bind_addr: SocketAddr, role: DeviceRole, device_mac: MacAddress) -> Self {
        Self {
            bind_addr,
            role,
            device_mac,
            delivery: DeliveryPath::HttpPush,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            payload_gap: Duration::from_millis(DEFAULT_PAYLOAD_GAP_MS),
            relay_linger: Duration::from_millis(DEFAULT_RELAY_LINGER_MS),
            max_payload_size: MAX_PAYLOAD_SIZE,
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }

    pub fn with_delivery(mut self, delivery: DeliveryPath) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_payload_gap(mut self, payload_gap: Duration) -> Self {
        self.payload_gap = payload_gap;
        self
    }

    pub fn with_relay_linger(mut self, relay_linger: Duration) -> Self {
        self.relay_linger = relay_linger;
        self
    }

    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }
}

/// A scan accepted by a listener, ready for the access pipeline.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub payload: ScanPayload,

    /// Device the feedback goes to
    pub device: MacAddress,

    /// Tagged direction, or the listener role's direction
    pub direction: Direction,

    pub role: DeviceRole,

    pub peer: SocketAddr,
}

/// A payload that was acknowledged but could not be parsed.
#[derive(Debug)]
pub struct RejectedScan {
    /// The listener's configured device; an unreadable payload names none
    pub device: MacAddress,

    pub role: DeviceRole,

    pub peer: SocketAddr,

    pub error: doorman_core::Error,
}

/// Consumer of accepted scans.
///
/// Called on a dedicated task per scan. Implementations own their error
/// handling; nothing is reported back to the listener.
pub trait ScanHandler: Send + Sync + 'static {
    fn handle(&self, request: ScanRequest) -> impl Future<Output = ()> + Send;

    /// Called for a payload that was acknowledged but could not be parsed.
    fn reject(&self, rejection: RejectedScan) -> impl Future<Output = ()> + Send {
        let _ = rejection;
        async {}
    }

    /// Called when a keep-alive introduces a device the directory had not seen.
    fn device_announced(
        &self,
        device: MacAddress,
        role: DeviceRole,
    ) -> impl Future<Output = ()> + Send {
        let _ = (device, role);
        async {}
    }
}

/// Work handed from a connection to the [`ScanHandler`].
enum Dispatch {
    Scan(ScanRequest),
    Reject(RejectedScan),
    Announce { device: MacAddress, role: DeviceRole },
}

impl Dispatch {
    fn device(&self) -> MacAddress {
        match self {
            Dispatch::Scan(request) => request.device,
            Dispatch::Reject(rejection) => rejection.device,
            Dispatch::Announce { device, .. } => *device,
        }
    }

    async fn run<H: ScanHandler>(self, handler: Arc<H>) {
        match self {
            Dispatch::Scan(request) => handler.handle(request).await,
            Dispatch::Reject(rejection) => handler.reject(rejection).await,
            Dispatch::Announce { device, role } => handler.device_announced(device, role).await,
        }
    }
}

/// Errors raised by the listener and its connections.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] doorman_core::Error),

    #[error("No payload within {0}ms")]
    ReadTimeout(u64),

    #[error("Connection closed before a payload arrived")]
    ConnectionClosed,
}

pub type ListenerResult<T> = std::result::Result<T, ListenerError>;

/// Accepts scanner connections for one role.
pub struct IngressListener<H> {
    listener: TcpListener,
    config: Arc<ListenerConfig>,
    handler: Arc<H>,
    directory: Arc<DeviceDirectory>,
    relay: Arc<RelayHub>,
}

impl<H: ScanHandler> IngressListener<H> {
    /// Bind the listener socket.
    ///
    /// # Errors
    ///
    /// `ListenerError::Bind` if the address is in use or not permitted.
    pub async fn bind(
        config: ListenerConfig,
        handler: Arc<H>,
        directory: Arc<DeviceDirectory>,
        relay: Arc<RelayHub>,
    ) -> ListenerResult<Self> {
        let listener =
            TcpListener::bind(config.bind_addr)
                .await
                .map_err(|source| ListenerError::Bind {
                    addr: config.bind_addr,
                    source,
                })?;

        info!(
            addr = %listener.local_addr()?,
            role = %config.role,
            device = %config.device_mac,
            delivery = ?config.delivery,
            "Ingress listener bound"
        );

        Ok(Self {
            listener,
            config: Arc::new(config),
            handler,
            directory,
            relay,
        })
    }

    pub fn local_addr(&self) -> ListenerResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Accept connections until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// Accept errors are logged and do not stop the loop. On shutdown the
    /// connections already being served, and the handler work they started,
    /// get `shutdown_grace` to finish before they are aborted.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ListenerResult<()> {
        let role = self.config.role;
        let mut connections = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(role = %role, error = %e, "Accept failed");
                            continue;
                        }
                    };

                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let connection = Connection {
                        framed: Framed::new(
                            stream,
                            IngressCodec::with_max_payload_size(self.config.max_payload_size),
                        ),
                        peer,
                        machine: ConnectionStateMachine::new(),
                        config: Arc::clone(&self.config),
                        handler: Arc::clone(&self.handler),
                        directory: Arc::clone(&self.directory),
                        relay: Arc::clone(&self.relay),
                        shutdown: shutdown.clone(),
                    };

                    connections.spawn(connection.serve());
                }

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        warn!(role = %role, error = %e, "Connection task panicked");
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        drop(self.listener);
        if !connections.is_empty() {
            debug!(role = %role, pending = connections.len(), "Draining connections");
            let drained = tokio::time::timeout(self.config.shutdown_grace, async {
                while connections.join_next().await.is_some() {}
            })
            .await;

            if drained.is_err() {
                warn!(
                    role = %role,
                    pending = connections.len(),
                    grace_ms = self.config.shutdown_grace.as_millis() as u64,
                    "Connections still running after shutdown grace, aborting"
                );
                connections.abort_all();
                while connections.join_next().await.is_some() {}
            }
        }

        info!(role = %role, "Ingress listener stopped");
        Ok(())
    }
}

/// Handler task spawned by a connection, aborted when the connection is.
struct HandlerTask(JoinHandle<()>);

impl Drop for HandlerTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct Connection<H> {
    framed: Framed<TcpStream, IngressCodec>,
    peer: SocketAddr,
    machine: ConnectionStateMachine,
    config: Arc<ListenerConfig>,
    handler: Arc<H>,
    directory: Arc<DeviceDirectory>,
    relay: Arc<RelayHub>,
    shutdown: watch::Receiver<bool>,
}

impl<H: ScanHandler> Connection<H> {
    async fn serve(mut self) {
        let peer = self.peer;
        let role = self.config.role;
        debug!(peer = %peer, role = %role, "Scanner connected");

        let dispatched = match self.process().await {
            Ok(dispatched) => {
                trace!(peer = %peer, "Connection finished");
                dispatched
            }
            Err(ListenerError::ConnectionClosed) => {
                debug!(peer = %peer, "Connection closed without payload");
                None
            }
            Err(e) => {
                warn!(peer = %peer, role = %role, error = %e, "Connection failed");
                None
            }
        };

        if self.machine.current_state() != ListenerState::Idle
            && let Err(e) = self.machine.transition_to(ListenerState::Idle)
        {
            warn!(peer = %peer, error = %e, "Connection left in unexpected state");
        }

        // Close the socket before waiting on the handler
        drop(self.framed);

        if let Some(mut task) = dispatched
            && let Err(e) = (&mut task.0).await
            && e.is_panic()
        {
            warn!(peer = %peer, role = %role, error = %e, "Scan handler panicked");
        }
    }

    /// Serve one payload. Returns the handler task when work was dispatched.
    async fn process(&mut self) -> ListenerResult<Option<HandlerTask>> {
        self.machine.transition_to(ListenerState::ConnectionAccepted)?;

        let frame = match self.read_frame().await {
            Ok(frame) => Ok(frame),
            Err(ListenerError::Protocol(e)) if e.is_malformed_payload() => Err(e),
            Err(e) => return Err(e),
        };
        self.machine.transition_to(ListenerState::PayloadRead)?;

        // The scan was presented even if the ack cannot be written
        if let Err(e) = self.framed.send(IngressReply::Ack).await {
            warn!(peer = %self.peer, error = %e, "Failed to acknowledge payload");
        }

        let dispatch = match frame {
            Err(error) => {
                warn!(
                    peer = %self.peer,
                    role = %self.config.role,
                    error = %error,
                    "Unreadable payload acknowledged, denying"
                );
                Dispatch::Reject(RejectedScan {
                    device: self.config.device_mac,
                    role: self.config.role,
                    peer: self.peer,
                    error,
                })
            }
            Ok(IngressFrame::KeepAlive) => {
                let device = self.config.device_mac;
                if self.directory.observe(device, self.peer.ip()) != Observation::New {
                    trace!(peer = %self.peer, "Keep-alive acknowledged");
                    self.machine.transition_to(ListenerState::Idle)?;
                    return Ok(None);
                }

                info!(mac = %device, ip = %self.peer.ip(), "Device announced itself");
                Dispatch::Announce {
                    device,
                    role: self.config.role,
                }
            }
            Ok(IngressFrame::Scan(payload)) => {
                let device = payload.mac.unwrap_or(self.config.device_mac);
                if self.directory.observe(device, self.peer.ip()) == Observation::New {
                    info!(mac = %device, ip = %self.peer.ip(), "Device announced itself");
                }

                let request = ScanRequest {
                    device,
                    direction: payload.direction_or(self.config.role.direction()),
                    role: self.config.role,
                    peer: self.peer,
                    payload,
                };

                info!(
                    credential = %request.payload.credential,
                    direction = %request.direction,
                    device = %device,
                    "Scan received"
                );
                Dispatch::Scan(request)
            }
        };

        let session = match self.config.delivery {
            DeliveryPath::SessionRelay => Some(self.relay.open(dispatch.device())),
            DeliveryPath::HttpPush => None,
        };

        let task = HandlerTask(tokio::spawn(dispatch.run(Arc::clone(&self.handler))));
        self.machine.transition_to(ListenerState::PipelineDispatched)?;

        if let Some(session) = session {
            self.linger(session).await;
        }

        self.machine.transition_to(ListenerState::Idle)?;
        Ok(Some(task))
    }

    /// Read one payload, ending it at a newline, EOF or a quiet gap.
    async fn read_frame(&mut self) -> ListenerResult<IngressFrame> {
        let deadline = Instant::now() + self.config.read_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ListenerError::ReadTimeout(
                    self.config.read_timeout.as_millis() as u64,
                ));
            }

            match tokio::time::timeout(remaining.min(self.config.payload_gap), self.framed.next())
                .await
            {
                Ok(Some(frame)) => return Ok(frame?),
                Ok(None) => return Err(ListenerError::ConnectionClosed),
                Err(_) if self.framed.read_buffer().is_empty() => continue,
                Err(_) => {
                    let mut pending = self.framed.read_buffer_mut().split();
                    let mut codec = self.framed.codec().clone();
                    if let Some(frame) = codec.decode_eof(&mut pending)? {
                        return Ok(frame);
                    }
                }
            }
        }
    }

    /// Keep the connection open and forward relayed display messages.
    async fn linger(&mut self, mut session: RelaySession) {
        let expires = tokio::time::sleep(self.config.relay_linger);
        tokio::pin!(expires);

        loop {
            tokio::select! {
                _ = &mut expires => break,

                message = session.recv() => {
                    let Some(text) = message else {
                        debug!(mac = %session.mac(), "Relay session superseded");
                        break;
                    };

                    if let Err(e) = self.framed.send(IngressReply::Relay(text)).await {
                        warn!(mac = %session.mac(), error = %e, "Relay write failed");
                        break;
                    }
                    trace!(mac = %session.mac(), "Display message relayed");
                }

                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
