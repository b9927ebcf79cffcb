use crate::{
    Result,
    constants::{DEFAULT_ENTRY_PORT, DEFAULT_EXIT_PORT, MAX_CREDENTIAL_LENGTH, MIN_CREDENTIAL_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Badge credential (8-32 alphanumeric characters after normalization)
///
/// Scanners deliver raw serial data that may carry framing bytes, spaces or
/// line endings. Every non-alphanumeric character is stripped and the rest is
/// uppercased before the length check.
///
/// # Security
/// This type implements constant-time comparison to prevent timing attacks
/// when comparing credentials during validation.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Credential(String);

impl Credential {
    /// Create a new credential with normalization and validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidCredential` if the normalized value is not
    /// between 8 and 32 characters long.
    pub fn new(raw: &str) -> Result<Self> {
        let normalized = Self::normalize(raw);

        let len = normalized.len();
        if !(MIN_CREDENTIAL_LENGTH..=MAX_CREDENTIAL_LENGTH).contains(&len) {
            return Err(Error::InvalidCredential(format!(
                "Credential must be {MIN_CREDENTIAL_LENGTH}-{MAX_CREDENTIAL_LENGTH} alphanumeric chars, got {len}"
            )));
        }

        Ok(Credential(normalized))
    }

    /// Strip non-alphanumeric characters and uppercase the remainder.
    ///
    /// ```
    /// use doorman_core::Credential;
    ///
    /// assert_eq!(Credential::normalize(" 08-00:58 db\r\nb1 "), "080058DBB1");
    /// ```
    #[must_use]
    pub fn normalize(raw: &str) -> String {
        raw.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    /// Get the credential as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Credential {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Credential::new(s)
    }
}

impl TryFrom<String> for Credential {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Credential::new(&value)
    }
}

impl From<Credential> for String {
    fn from(value: Credential) -> Self {
        value.0
    }
}

/// Constant-time comparison implementation for Credential
impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for Credential {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Direction of a crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Entry,
    Exit,
}

impl Direction {
    /// Stable lowercase name used in storage and on the wire.
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Entry => "entry",
            Direction::Exit => "exit",
        }
    }

    /// Returns `true` if direction is Entry.
    #[inline]
    #[must_use]
    pub fn is_entry(self) -> bool {
        matches!(self, Direction::Entry)
    }

    /// Returns `true` if direction is Exit.
    #[inline]
    #[must_use]
    pub fn is_exit(self) -> bool {
        matches!(self, Direction::Exit)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "entry" | "in" => Ok(Direction::Entry),
            "exit" | "out" => Ok(Direction::Exit),
            other => Err(Error::InvalidPayload(format!("Unknown direction: {other}"))),
        }
    }
}

/// Hardware (MAC) address of a scanner or display unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Create a MAC address from raw octets.
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }

    /// Get the raw octets.
    #[must_use]
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl std::str::FromStr for MacAddress {
    type Err = Error;

    /// Parse `AA:BB:CC:DD:EE:FF` or `aa-bb-cc-dd-ee-ff`.
    ///
    /// Single-digit octets (`e4:5:...`) are accepted because BSD-style
    /// `arp -a` output omits leading zeros.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut octets = [0u8; 6];
        let mut count = 0;

        for part in s.split([':', '-']) {
            if count == 6 || part.is_empty() || part.len() > 2 {
                return Err(Error::InvalidMacAddress(s.to_string()));
            }
            octets[count] =
                u8::from_str_radix(part, 16).map_err(|_| Error::InvalidMacAddress(s.to_string()))?;
            count += 1;
        }

        if count != 6 {
            return Err(Error::InvalidMacAddress(s.to_string()));
        }

        Ok(MacAddress(octets))
    }
}

impl Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Role of a scan point
///
/// Each physical gate has its own scanner, listener port and display unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Entry,
    Exit,
}

impl DeviceRole {
    /// Direction recorded for scans arriving from this role.
    #[must_use]
    pub fn direction(self) -> Direction {
        match self {
            DeviceRole::Entry => Direction::Entry,
            DeviceRole::Exit => Direction::Exit,
        }
    }

    /// Default ingress listener port for this role.
    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            DeviceRole::Entry => DEFAULT_ENTRY_PORT,
            DeviceRole::Exit => DEFAULT_EXIT_PORT,
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceRole::Entry => write!(f, "entry"),
            DeviceRole::Exit => write!(f, "exit"),
        }
    }
}
