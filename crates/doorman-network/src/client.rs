//! TCP client speaking the scanner side of the ingress protocol.
//!
//! Used by the `doorman scan` command and the integration tests to act as a
//! scanner: connect, write one payload line, read the `OK` acknowledgment
//! and, for relay devices, read the display messages that follow.
//!
//! # Example Usage
//!
//! ```no_run
//! use doorman_network::{IngressClient, IngressClientConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IngressClientConfig {
//!     server_addr: "127.0.0.1:8080".parse()?,
//!     timeout: Duration::from_millis(5000),
//! };
//!
//! let mut client = IngressClient::new(config);
//! client.connect().await?;
//! client.send_payload("ABC12345").await?;
//! client.recv_ack().await?;
//! client.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! No retries and no connection reuse: one connection carries one scan,
//! exactly like the scanner firmware.

use doorman_core::constants::{ACK_TOKEN, DEFAULT_ENTRY_PORT, DEFAULT_READ_TIMEOUT_MS};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone)]
pub struct IngressClientConfig {
    /// Listener address to connect to
    pub server_addr: SocketAddr,

    /// Timeout for each I/O operation (connect, send, recv)
    pub timeout: Duration,
}

impl Default for IngressClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_ENTRY_PORT)),
            timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngressClientError {
    #[error("Not connected to listener")]
    NotConnected,

    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    #[error("Read timeout after {0}ms")]
    ReadTimeout(u64),

    #[error("Write timeout after {0}ms")]
    WriteTimeout(u64),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The listener answered something other than the acknowledgment
    #[error("Unexpected reply: {0:?}")]
    UnexpectedReply(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type IngressClientResult<T> = std::result::Result<T, IngressClientError>;

/// Scanner-side ingress connection.
pub struct IngressClient {
    server_addr: SocketAddr,
    stream: Option<BufReader<TcpStream>>,
    timeout: Duration,
}

impl IngressClient {
    pub fn new(config: IngressClientConfig) -> Self {
        Self {
            server_addr: config.server_addr,
            stream: None,
            timeout: config.timeout,
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// # Errors
    ///
    /// `ConnectionTimeout` if the listener does not accept in time, `Io` if
    /// it refuses.
    pub async fn connect(&mut self) -> IngressClientResult<()> {
        debug!(addr = %self.server_addr, "Connecting to listener");

        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(self.server_addr))
            .await
            .map_err(|_| IngressClientError::ConnectionTimeout(self.timeout_ms()))??;

        if let Err(e) = stream.set_nodelay(true) {
            warn!(error = %e, "Failed to set TCP_NODELAY");
        }

        self.stream = Some(BufReader::new(stream));
        info!(addr = %self.server_addr, "Connected to listener");
        Ok(())
    }

    /// Write `payload` followed by a newline.
    pub async fn send_payload(&mut self, payload: &str) -> IngressClientResult<()> {
        let timeout = self.timeout;
        let timeout_ms = self.timeout_ms();
        let stream = self.stream.as_mut().ok_or(IngressClientError::NotConnected)?;

        let mut line = String::with_capacity(payload.len() + 1);
        line.push_str(payload.trim_end_matches(['\r', '\n']));
        line.push('\n');

        tokio::time::timeout(timeout, async {
            stream.get_mut().write_all(line.as_bytes()).await?;
            stream.get_mut().flush().await
        })
        .await
        .map_err(|_| IngressClientError::WriteTimeout(timeout_ms))??;

        trace!(payload = %payload, "Payload sent");
        Ok(())
    }

    /// Wait for the 2-byte acknowledgment.
    ///
    /// # Errors
    ///
    /// `UnexpectedReply` if the bytes are not `OK`, `ConnectionLost` if the
    /// listener closes first.
    pub async fn recv_ack(&mut self) -> IngressClientResult<()> {
        let timeout = self.timeout;
        let timeout_ms = self.timeout_ms();
        let stream = self.stream.as_mut().ok_or(IngressClientError::NotConnected)?;

        let mut reply = [0u8; 2];
        let read = tokio::time::timeout(timeout, stream.read_exact(&mut reply)).await;
        match read {
            Err(_) => Err(IngressClientError::ReadTimeout(timeout_ms)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(
                IngressClientError::ConnectionLost("Listener closed before acknowledging".into()),
            ),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(_)) if &reply == ACK_TOKEN => {
                trace!("Acknowledged");
                Ok(())
            }
            Ok(Ok(_)) => Err(IngressClientError::UnexpectedReply(
                String::from_utf8_lossy(&reply).into_owned(),
            )),
        }
    }

    /// Read one relayed display message (lines up to an empty line).
    ///
    /// Returns `Ok(None)` when the listener closes the connection cleanly
    /// before a message starts.
    pub async fn recv_relay(&mut self) -> IngressClientResult<Option<String>> {
        let timeout = self.timeout;
        let timeout_ms = self.timeout_ms();
        let stream = self.stream.as_mut().ok_or(IngressClientError::NotConnected)?;

        let mut lines: Vec<String> = Vec::new();
        loop {
            let mut line = String::new();
            let read = tokio::time::timeout(timeout, stream.read_line(&mut line))
                .await
                .map_err(|_| IngressClientError::ReadTimeout(timeout_ms))??;

            if read == 0 {
                if lines.is_empty() {
                    return Ok(None);
                }
                return Err(IngressClientError::ConnectionLost(
                    "Listener closed inside a relayed message".into(),
                ));
            }

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if lines.is_empty() {
                    continue;
                }
                return Ok(Some(lines.join("\n")));
            }
            lines.push(line.to_string());
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Shut the connection down. Idempotent.
    pub async fn close(&mut self) -> IngressClientResult<()> {
        if let Some(stream) = self.stream.take() {
            let mut stream = stream.into_inner();
            match tokio::time::timeout(Duration::from_millis(500), stream.shutdown()).await {
                Ok(Ok(())) => debug!(addr = %self.server_addr, "Connection closed"),
                Ok(Err(e)) => warn!(error = %e, "Error during shutdown"),
                Err(_) => warn!("Shutdown timeout during close"),
            }
        }
        Ok(())
    }
}
