//! Core constants for the doorman access system.
//!
//! These values are shared by the ingress listeners, the feedback dispatcher
//! and the storage layer. Most of them are defaults that the server
//! configuration can override.
//!
//! # Wire Summary
//!
//! ```text
//! device ──TCP──> listener      "<credential>[;mac=<MAC>][;dir=entry|exit]\n"
//! listener ──TCP──> device      "OK"
//! server ──HTTP──> device       POST /message  (text/plain, one display line per \n)
//! ```
//!
//! # Usage
//!
//! ```
//! use doorman_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(ACK_TOKEN, b"OK");
//! let interval = Duration::from_millis(DEFAULT_DISPLAY_INTERVAL_MS);
//! assert_eq!(interval.as_secs(), 3);
//! ```

// ============================================================================
// Ingress Protocol
// ============================================================================

/// Acknowledgment written back to the device after a payload is read.
pub const ACK_TOKEN: &[u8; 2] = b"OK";

/// Keep-alive payload sent by devices to verify the link.
///
/// Answered with [`ACK_TOKEN`] without engaging the access pipeline.
pub const KEEPALIVE_TOKEN: &str = "TEST_CONNECTION";

/// Separator between the credential and optional payload tags.
pub const PAYLOAD_TAG_SEPARATOR: char = ';';

/// Tag prefix carrying the sender's hardware address.
pub const PAYLOAD_TAG_MAC: &str = "mac=";

/// Tag prefix carrying an explicit direction.
pub const PAYLOAD_TAG_DIRECTION: &str = "dir=";

/// Maximum accepted payload size in bytes.
///
/// Matches the single 1024-byte receive the scanners were built around.
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Default listen port for entry-point scanners.
pub const DEFAULT_ENTRY_PORT: u16 = 8080;

/// Default listen port for exit-point scanners.
pub const DEFAULT_EXIT_PORT: u16 = 8081;

/// Default timeout for reading one payload from an accepted connection (milliseconds).
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5000;

/// Quiet period after which buffered bytes are taken as a complete payload (milliseconds).
///
/// Scanner firmware writes the credential without a terminator and then
/// waits for the acknowledgment, so neither a newline nor EOF ever arrives.
pub const DEFAULT_PAYLOAD_GAP_MS: u64 = 250;

/// How long a relay session stays open after the acknowledgment (milliseconds).
///
/// Must exceed the display interval so the idle message can follow the outcome.
pub const DEFAULT_RELAY_LINGER_MS: u64 = 8000;

/// How long a stopping listener waits for open connections and their scans
/// to finish (milliseconds). Covers one full feedback delivery.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 10_000;

// ============================================================================
// Credentials
// ============================================================================

/// Minimum credential length after normalization.
pub const MIN_CREDENTIAL_LENGTH: usize = 8;

/// Maximum credential length after normalization.
pub const MAX_CREDENTIAL_LENGTH: usize = 32;

// ============================================================================
// Feedback Delivery
// ============================================================================

/// HTTP port of the display unit's message endpoint.
pub const DEFAULT_DISPLAY_PORT: u16 = 80;

/// Path of the display unit's message endpoint.
pub const DEFAULT_MESSAGE_PATH: &str = "/message";

/// Delay between the outcome message and the idle message (milliseconds).
pub const DEFAULT_DISPLAY_INTERVAL_MS: u64 = 3000;

/// Lower bound accepted for the display interval (milliseconds).
pub const MIN_DISPLAY_INTERVAL_MS: u64 = 3000;

/// Upper bound accepted for the display interval (milliseconds).
pub const MAX_DISPLAY_INTERVAL_MS: u64 = 4000;

/// Upper bound on one feedback delivery, address discovery included (milliseconds).
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// Discovery
// ============================================================================

/// Timeout for a single reachability probe (milliseconds).
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5000;

/// Kernel ARP table location on Linux hosts.
pub const PROC_NET_ARP: &str = "/proc/net/arp";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_linger_outlives_display_interval() {
        assert!(DEFAULT_RELAY_LINGER_MS > MAX_DISPLAY_INTERVAL_MS);
    }

    #[test]
    fn test_shutdown_grace_covers_delivery() {
        assert!(DEFAULT_SHUTDOWN_GRACE_MS > DEFAULT_DELIVERY_TIMEOUT_MS);
    }

    #[test]
    fn test_display_interval_within_bounds() {
        assert!(
            (MIN_DISPLAY_INTERVAL_MS..=MAX_DISPLAY_INTERVAL_MS)
                .contains(&DEFAULT_DISPLAY_INTERVAL_MS)
        );
    }

    #[test]
    fn test_ports_distinct() {
        assert_ne!(DEFAULT_ENTRY_PORT, DEFAULT_EXIT_PORT);
    }
}
