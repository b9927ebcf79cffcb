use super::NetworkDiscoverySource;
use doorman_core::constants::PROC_NET_ARP;
use doorman_core::{Error, MacAddress, Result};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// One resolved neighbour table row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: IpAddr,
    pub mac: MacAddress,
}

/// Discovery backed by the host's ARP cache.
///
/// Reads the kernel table first and falls back to `arp -a` when the table
/// is missing (non-Linux hosts) or has no row for the address.
#[derive(Debug, Clone)]
pub struct ArpTableSource {
    proc_path: PathBuf,
    command_timeout: Duration,
    use_command: bool,
}

impl Default for ArpTableSource {
    fn default() -> Self {
        Self {
            proc_path: PathBuf::from(PROC_NET_ARP),
            command_timeout: Duration::from_secs(5),
            use_command: true,
        }
    }
}

impl ArpTableSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the kernel table from another location.
    pub fn with_proc_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_path = path.into();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Disable the `arp -a` fallback.
    pub fn without_command(mut self) -> Self {
        self.use_command = false;
        self
    }

    async fn read_proc(&self) -> Result<Vec<ArpEntry>> {
        let text = tokio::fs::read_to_string(&self.proc_path).await?;
        Ok(parse_proc_net_arp(&text))
    }

    async fn run_command(&self) -> Result<Vec<ArpEntry>> {
        let output = Command::new("arp")
            .arg("-a")
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.command_timeout, output)
            .await
            .map_err(|_| {
                Error::DiscoveryFailed(format!(
                    "arp -a timed out after {}ms",
                    self.command_timeout.as_millis()
                ))
            })??;

        if !output.status.success() {
            return Err(Error::DiscoveryFailed(format!(
                "arp -a exited with {}",
                output.status
            )));
        }

        Ok(parse_arp_command(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl NetworkDiscoverySource for ArpTableSource {
    async fn lookup(&self, mac: MacAddress) -> Result<Option<IpAddr>> {
        let proc_result = self.read_proc().await;

        if let Ok(entries) = &proc_result {
            trace!(entries = entries.len(), "Read kernel ARP table");
            if let Some(entry) = entries.iter().find(|e| e.mac == mac) {
                return Ok(Some(entry.ip));
            }
        }

        if !self.use_command {
            return proc_result.map(|_| None).map_err(|e| {
                Error::DiscoveryFailed(format!("Cannot read {}: {e}", self.proc_path.display()))
            });
        }

        match self.run_command().await {
            Ok(entries) => Ok(entries.iter().find(|e| e.mac == mac).map(|e| e.ip)),
            Err(e) if proc_result.is_ok() => {
                debug!(error = %e, "arp -a fallback failed");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Parse the Linux kernel table (`/proc/net/arp`).
///
/// Incomplete rows (flags `0x0` or an all-zero address) are skipped.
pub fn parse_proc_net_arp(text: &str) -> Vec<ArpEntry> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [ip, _hw_type, flags, mac, ..] = fields.as_slice() else {
                return None;
            };

            if *flags == "0x0" {
                return None;
            }

            let ip = ip.parse().ok()?;
            let mac: MacAddress = mac.parse().ok()?;
            (mac.octets() != [0; 6]).then_some(ArpEntry { ip, mac })
        })
        .collect()
}

/// Parse `arp -a` output.
///
/// Handles the BSD/Linux form `? (192.168.1.23) at e4:65:b8:27:73:8 on en0`
/// and the Windows form `192.168.1.23   e4-65-b8-27-73-08   dynamic`.
pub fn parse_arp_command(text: &str) -> Vec<ArpEntry> {
    text.lines()
        .filter_map(|line| {
            let mut ip = None;
            let mut mac = None;

            for token in line.split_whitespace() {
                let token = token.trim_matches(|c| c == '(' || c == ')');
                if ip.is_none()
                    && let Ok(parsed) = token.parse::<IpAddr>()
                {
                    ip = Some(parsed);
                } else if mac.is_none()
                    && let Ok(parsed) = token.parse::<MacAddress>()
                {
                    mac = Some(parsed);
                }
            }

            Some(ArpEntry {
                ip: ip?,
                mac: mac.filter(|m| m.octets() != [0; 6])?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const PROC_SAMPLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.1.1      0x1         0x2         b0:be:76:12:34:56     *        wlan0
192.168.1.23     0x1         0x2         e4:65:b8:27:73:08     *        wlan0
192.168.1.40     0x1         0x0         00:00:00:00:00:00     *        wlan0
";

    const ARP_LINUX: &str = "\
? (192.168.1.1) at b0:be:76:12:34:56 [ether] on wlan0
esp32-entry.lan (192.168.1.23) at e4:65:b8:27:73:08 [ether] on wlan0
? (192.168.1.40) at <incomplete> on wlan0
";

    const ARP_MACOS: &str = "\
? (192.168.1.23) at e4:65:b8:27:73:8 on en0 ifscope [ethernet]
";

    const ARP_WINDOWS: &str = "\
Interface: 192.168.1.10 --- 0xb
  Internet Address      Physical Address      Type
  192.168.1.23          e4-65-b8-27-73-08     dynamic
";

    fn esp32() -> MacAddress {
        "E4:65:B8:27:73:08".parse().unwrap()
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn test_parse_proc_net_arp() {
        let entries = parse_proc_net_arp(PROC_SAMPLE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1], ArpEntry { ip: ip(23), mac: esp32() });
    }

    #[test]
    fn test_parse_arp_command_linux() {
        let entries = parse_arp_command(ARP_LINUX);
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&ArpEntry { ip: ip(23), mac: esp32() }));
    }

    #[test]
    fn test_parse_arp_command_macos_short_octet() {
        let entries = parse_arp_command(ARP_MACOS);
        assert_eq!(entries, vec![ArpEntry { ip: ip(23), mac: esp32() }]);
    }

    #[test]
    fn test_parse_arp_command_windows() {
        let entries = parse_arp_command(ARP_WINDOWS);
        assert_eq!(entries, vec![ArpEntry { ip: ip(23), mac: esp32() }]);
    }

    #[tokio::test]
    async fn test_lookup_from_proc_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("arp");
        tokio::fs::write(&path, PROC_SAMPLE).await.unwrap();

        let source = ArpTableSource::new().with_proc_path(&path).without_command();
        assert_eq!(source.lookup(esp32()).await.unwrap(), Some(ip(23)));

        let unknown: MacAddress = "AA:AA:AA:AA:AA:AA".parse().unwrap();
        assert_eq!(source.lookup(unknown).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_missing_table_fails() {
        let source = ArpTableSource::new()
            .with_proc_path("/nonexistent/doorman/arp")
            .without_command();

        assert!(matches!(
            source.lookup(esp32()).await,
            Err(Error::DiscoveryFailed(_))
        ));
    }
}
