//! Scan outcomes produced by the access pipeline.
//!
//! A [`ScanOutcome`] is transient: it is built once per scan, handed to the
//! feedback dispatcher and dropped. Persisted state lives in the session log.

use crate::{Direction, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a scan was accepted or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeReason {
    GrantedEntry,
    GrantedExit,
    DeniedUnregistered,
    DeniedInactive,
    DeniedAlreadyInside,
    DeniedNoOpenEntry,
    DeniedServerError,
}

impl OutcomeReason {
    /// Reason for a successful crossing in `direction`.
    #[must_use]
    pub fn granted(direction: Direction) -> Self {
        match direction {
            Direction::Entry => OutcomeReason::GrantedEntry,
            Direction::Exit => OutcomeReason::GrantedExit,
        }
    }

    /// Map a pipeline error to the denial shown on the display.
    ///
    /// A card that cannot be read as a credential is shown as unregistered.
    /// Anything else that is not a decision denial is a server error.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::UnknownCredential(_) => OutcomeReason::DeniedUnregistered,
            e if e.is_malformed_payload() => OutcomeReason::DeniedUnregistered,
            Error::InactiveCredential(_) => OutcomeReason::DeniedInactive,
            Error::AlreadyInside(_) => OutcomeReason::DeniedAlreadyInside,
            Error::NoOpenEntry(_) => OutcomeReason::DeniedNoOpenEntry,
            _ => OutcomeReason::DeniedServerError,
        }
    }

    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, OutcomeReason::GrantedEntry | OutcomeReason::GrantedExit)
    }

    /// Stable kebab-case name, used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeReason::GrantedEntry => "granted-entry",
            OutcomeReason::GrantedExit => "granted-exit",
            OutcomeReason::DeniedUnregistered => "denied-unregistered",
            OutcomeReason::DeniedInactive => "denied-inactive",
            OutcomeReason::DeniedAlreadyInside => "denied-already-inside",
            OutcomeReason::DeniedNoOpenEntry => "denied-no-open-entry",
            OutcomeReason::DeniedServerError => "denied-server-error",
        }
    }
}

impl fmt::Display for OutcomeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one scan, consumed by the feedback dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub accepted: bool,
    pub reason: OutcomeReason,
    pub display_name: Option<String>,
}

impl ScanOutcome {
    /// Outcome for a granted crossing.
    pub fn granted(direction: Direction, display_name: impl Into<String>) -> Self {
        Self {
            accepted: true,
            reason: OutcomeReason::granted(direction),
            display_name: Some(display_name.into()),
        }
    }

    /// Outcome for a denied scan.
    pub fn denied(reason: OutcomeReason, display_name: Option<String>) -> Self {
        Self {
            accepted: false,
            reason,
            display_name,
        }
    }

    /// Build a denial from a pipeline error.
    pub fn from_error(error: &Error, display_name: Option<String>) -> Self {
        Self::denied(OutcomeReason::from_error(error), display_name)
    }
}
