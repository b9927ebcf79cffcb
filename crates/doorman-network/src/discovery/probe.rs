use super::ReachabilityProbe;
use doorman_core::constants::{DEFAULT_DISPLAY_PORT, DEFAULT_PROBE_TIMEOUT_MS};
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::debug;

/// One ICMP echo via the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProbe {
    timeout: Duration,
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS))
    }
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ReachabilityProbe for PingProbe {
    async fn probe(&self, addr: IpAddr) -> bool {
        let status = Command::new("ping")
            .args(["-c", "1"])
            .arg(addr.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(self.timeout, status).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!(addr = %addr, error = %e, "ping could not be run");
                false
            }
            Err(_) => {
                debug!(addr = %addr, timeout_ms = self.timeout.as_millis() as u64, "ping timed out");
                false
            }
        }
    }
}

/// One TCP connect to the device's display port.
///
/// Works without raw-socket privileges and checks the port feedback is
/// actually pushed to.
#[derive(Debug, Clone)]
pub struct TcpConnectProbe {
    port: u16,
    timeout: Duration,
}

impl Default for TcpConnectProbe {
    fn default() -> Self {
        Self::new(
            DEFAULT_DISPLAY_PORT,
            Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
        )
    }
}

impl TcpConnectProbe {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

impl ReachabilityProbe for TcpConnectProbe {
    async fn probe(&self, addr: IpAddr) -> bool {
        let target = SocketAddr::new(addr, self.port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                debug!(target = %target, error = %e, "TCP probe refused");
                false
            }
            Err(_) => {
                debug!(target = %target, "TCP probe timed out");
                false
            }
        }
    }
}
