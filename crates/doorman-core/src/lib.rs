pub mod constants;
pub mod error;
pub mod outcome;
pub mod types;

pub use error::{Error, Result};
pub use outcome::{OutcomeReason, ScanOutcome};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
