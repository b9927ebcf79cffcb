//! Ingress payload parsing.
//!
//! Scanners send a single line of text per connection. The line carries the
//! credential and may carry optional tags:
//!
//! ```text
//! <CREDENTIAL>[;mac=<HARDWARE_ADDRESS>][;dir=entry|exit]
//! ```
//!
//! The bare keep-alive `TEST_CONNECTION` is recognized separately and never
//! reaches the access pipeline.
//!
//! # Examples
//!
//! ```
//! use doorman_protocol::{IngressFrame, ScanPayload};
//! use doorman_core::Direction;
//!
//! let frame = IngressFrame::parse("080058DBB1;mac=E4:65:B8:27:73:08;dir=entry").unwrap();
//! let IngressFrame::Scan(scan) = frame else { panic!("expected scan") };
//! assert_eq!(scan.credential.as_str(), "080058DBB1");
//! assert_eq!(scan.direction, Some(Direction::Entry));
//!
//! assert_eq!(IngressFrame::parse("TEST_CONNECTION").unwrap(), IngressFrame::KeepAlive);
//! ```

use doorman_core::constants::{
    KEEPALIVE_TOKEN, PAYLOAD_TAG_DIRECTION, PAYLOAD_TAG_MAC, PAYLOAD_TAG_SEPARATOR,
};
use doorman_core::{Credential, Direction, Error, MacAddress, Result};
use std::fmt;

/// A credential scan as received from a scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPayload {
    /// Normalized credential.
    pub credential: Credential,

    /// Hardware address announced by the sender, if tagged.
    pub mac: Option<MacAddress>,

    /// Explicit direction, if tagged. Otherwise the listener role decides.
    pub direction: Option<Direction>,
}

impl ScanPayload {
    /// Create an untagged payload.
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            mac: None,
            direction: None,
        }
    }

    /// Attach a hardware address tag.
    pub fn with_mac(mut self, mac: MacAddress) -> Self {
        self.mac = Some(mac);
        self
    }

    /// Attach a direction tag.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Parse a scan line (without the keep-alive check).
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCredential` if the credential does not normalize
    /// to a valid value, and `Error::InvalidPayload` for malformed or unknown tags.
    pub fn parse(line: &str) -> Result<Self> {
        let mut parts = line.split(PAYLOAD_TAG_SEPARATOR);

        let credential = Credential::new(parts.next().unwrap_or_default())?;
        let mut payload = ScanPayload::new(credential);

        for tag in parts.map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(value) = strip_prefix_ignore_case(tag, PAYLOAD_TAG_MAC) {
                if payload.mac.is_some() {
                    return Err(Error::InvalidPayload("Duplicate mac tag".to_string()));
                }
                payload.mac = Some(value.parse()?);
            } else if let Some(value) = strip_prefix_ignore_case(tag, PAYLOAD_TAG_DIRECTION) {
                if payload.direction.is_some() {
                    return Err(Error::InvalidPayload("Duplicate dir tag".to_string()));
                }
                payload.direction = Some(value.parse()?);
            } else {
                return Err(Error::InvalidPayload(format!("Unknown tag: {tag}")));
            }
        }

        Ok(payload)
    }

    /// Direction to record, falling back to the listener's default.
    pub fn direction_or(&self, default: Direction) -> Direction {
        self.direction.unwrap_or(default)
    }
}

impl fmt::Display for ScanPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.credential)?;
        if let Some(mac) = self.mac {
            write!(f, "{PAYLOAD_TAG_SEPARATOR}{PAYLOAD_TAG_MAC}{mac}")?;
        }
        if let Some(direction) = self.direction {
            write!(f, "{PAYLOAD_TAG_SEPARATOR}{PAYLOAD_TAG_DIRECTION}{direction}")?;
        }
        Ok(())
    }
}

fn strip_prefix_ignore_case<'a>(tag: &'a str, prefix: &str) -> Option<&'a str> {
    let head = tag.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &tag[prefix.len()..])
}

/// One decoded ingress frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressFrame {
    /// Link test, answered without engaging the pipeline.
    KeepAlive,

    /// Credential scan.
    Scan(ScanPayload),
}

impl IngressFrame {
    /// Parse a trimmed ingress line.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPayload` for an empty line, otherwise any error
    /// from [`ScanPayload::parse`].
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();

        if line.is_empty() {
            return Err(Error::InvalidPayload("Empty payload".to_string()));
        }

        if line == KEEPALIVE_TOKEN {
            return Ok(IngressFrame::KeepAlive);
        }

        ScanPayload::parse(line).map(IngressFrame::Scan)
    }

    pub fn is_keepalive(&self) -> bool {
        matches!(self, IngressFrame::KeepAlive)
    }
}
