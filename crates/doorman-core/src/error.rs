use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Access decision errors
    #[error("Unknown credential: {0}")]
    UnknownCredential(String),

    #[error("Inactive credential: {0}")]
    InactiveCredential(String),

    #[error("Credential {0} is already inside")]
    AlreadyInside(String),

    #[error("No open entry for credential {0}")]
    NoOpenEntry(String),

    // Device errors
    #[error("Device {device} unreachable: {reason}")]
    DeviceUnreachable { device: String, reason: String },

    #[error("Delivery timeout after {0}ms")]
    DeliveryTimeout(u64),

    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    // Input errors
    #[error("Invalid credential format: {0}")]
    InvalidCredential(String),

    #[error("Invalid hardware address: {0}")]
    InvalidMacAddress(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns `true` for errors that represent a legitimate access denial
    /// rather than a system fault.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            Error::UnknownCredential(_)
                | Error::InactiveCredential(_)
                | Error::AlreadyInside(_)
                | Error::NoOpenEntry(_)
        )
    }

    /// Returns `true` for device-side delivery or discovery failures.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Error::DeviceUnreachable { .. } | Error::DeliveryTimeout(_) | Error::DiscoveryFailed(_)
        )
    }

    /// Returns `true` when a complete payload arrived but could not be parsed.
    pub fn is_malformed_payload(&self) -> bool {
        matches!(
            self,
            Error::InvalidCredential(_) | Error::InvalidMacAddress(_) | Error::InvalidPayload(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
