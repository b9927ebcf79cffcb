//! Display messages for scan feedback
//!
//! This module provides the text pushed to the display units after a scan.
//! Each line of a message is separated by `\n` and rendered on its own row
//! of the OLED panel.
//!
//! # Usage
//!
//! ```
//! use doorman_protocol::DisplayMessages;
//! use doorman_core::{DeviceRole, OutcomeReason};
//!
//! let text = DisplayMessages::render(OutcomeReason::GrantedEntry, Some("Arun Kumar"));
//! assert_eq!(text, "Access Granted\nWelcome Arun Kumar");
//!
//! assert_eq!(DisplayMessages::idle(DeviceRole::Exit), "EXIT SCANNER\nReady for scan...");
//! ```

use doorman_core::{DeviceRole, OutcomeReason};

/// Display messages for scan outcomes
///
/// # Message Format
///
/// - Short lines (the panels fit roughly 21 characters per row)
/// - ASCII characters only
/// - `{name}` is the holder's display name when one is known
pub struct DisplayMessages;

impl DisplayMessages {
    /// Idle screen on the entry scanner
    pub const ENTRY_IDLE: &'static str = "ENTRY SCANNER\nReady for scan...";

    /// Idle screen on the exit scanner
    pub const EXIT_IDLE: &'static str = "EXIT SCANNER\nReady for scan...";

    /// Prefix for a granted entry, followed by `Welcome {name}`
    pub const ACCESS_GRANTED: &'static str = "Access Granted";

    /// Prefix for a granted exit, followed by `Goodbye {name}`
    pub const EXIT_GRANTED: &'static str = "Exit Granted\nDoor Opened";

    /// Heading for every denial
    pub const ACCESS_DENIED: &'static str = "Access Denied";

    /// Credential not present in the registry
    pub const NOT_REGISTERED: &'static str = "Not Registered";

    /// Credential present but deactivated
    pub const INACTIVE_CARD: &'static str = "Inactive Card";

    /// Entry attempted while an entry is still open
    pub const ALREADY_INSIDE: &'static str = "Already Inside";

    /// Exit attempted without an open entry
    pub const NO_ENTRY_FOUND: &'static str = "No Entry Found";

    /// Storage or pipeline failure
    pub const SERVER_ERROR: &'static str = "Server Error";

    /// Idle message for a scanner role.
    pub fn idle(role: DeviceRole) -> &'static str {
        match role {
            DeviceRole::Entry => Self::ENTRY_IDLE,
            DeviceRole::Exit => Self::EXIT_IDLE,
        }
    }

    /// Render the outcome message for `reason`.
    ///
    /// Name-bearing templates fall back to an empty name when none is known.
    pub fn render(reason: OutcomeReason, display_name: Option<&str>) -> String {
        let name = display_name.unwrap_or_default();

        let text = match reason {
            OutcomeReason::GrantedEntry => {
                format!("{}\nWelcome {name}", Self::ACCESS_GRANTED)
            }
            OutcomeReason::GrantedExit => format!("{}\nGoodbye {name}", Self::EXIT_GRANTED),
            OutcomeReason::DeniedUnregistered => {
                format!("{}\n{}", Self::ACCESS_DENIED, Self::NOT_REGISTERED)
            }
            OutcomeReason::DeniedInactive => {
                format!("{}\n{}", Self::ACCESS_DENIED, Self::INACTIVE_CARD)
            }
            OutcomeReason::DeniedAlreadyInside => {
                format!("{}\n{}", Self::ACCESS_DENIED, Self::ALREADY_INSIDE)
            }
            OutcomeReason::DeniedNoOpenEntry => {
                format!("{}\n{}\n{name}", Self::NO_ENTRY_FOUND, Self::ACCESS_DENIED)
            }
            OutcomeReason::DeniedServerError => {
                format!("{}\n{}", Self::ACCESS_DENIED, Self::SERVER_ERROR)
            }
        };

        text.trim_end().to_string()
    }
}
