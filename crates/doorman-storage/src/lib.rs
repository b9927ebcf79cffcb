//! Storage layer for the doorman access system.
//!
//! SQLite-backed persistence for the credential registry and the session
//! log, plus the two decision components that sit directly on top of it.
//!
//! # Architecture
//!
//! - [`Database`]: connection pool manager with embedded migrations
//! - [`HolderRepository`], [`AccessEventRepository`]: data access traits
//! - [`CredentialValidator`]: read-only registry check
//! - [`SessionTracker`]: entry/exit state machine with per-credential locking
//! - [`transaction`]: write-first helpers used by the tracker
//! - [`OccupancyStats`]: derived counts for the operator surface
//!
//! # Session Model
//!
//! One `access_events` row per visit. A granted entry inserts an open row, a
//! granted exit resolves the open row with the highest `seq`. A partial unique
//! index keeps at most one open row per credential even if a caller bypasses
//! the tracker.
//!
//! # Examples
//!
//! ```no_run
//! use doorman_core::{Credential, Direction};
//! use doorman_storage::{CredentialValidator, Database, DatabaseConfig, SessionTracker};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(DatabaseConfig::new("doorman.db")).await?;
//! let validator = CredentialValidator::new(db.pool().clone());
//! let tracker = SessionTracker::new(db.pool().clone());
//!
//! let credential = Credential::new("ABC12345")?;
//! let valid = validator.validate(&credential).await?;
//! let event = tracker
//!     .record(&credential, Direction::Entry, Some(&valid.display_name))
//!     .await?;
//! println!("entry #{} for {}", event.seq, valid.display_name);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;
pub mod session;
pub mod stats;
pub mod transaction;
pub mod validator;

pub use connection::{Database, DatabaseConfig};
pub use error::{StorageError, StorageResult};
pub use models::{AccessEvent, CredentialHolder, HolderStatus};
pub use repositories::{
    AccessEventRepository, HolderRepository, SqliteAccessEventRepository, SqliteHolderRepository,
};
pub use session::SessionTracker;
pub use stats::OccupancyStats;
pub use validator::{CredentialValidator, ValidatedCredential};
