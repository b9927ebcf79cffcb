//! Doorman server: configuration, the access pipeline and process wiring.
//!
//! The `doorman` binary is a thin clap front end over this crate.

pub mod app;
pub mod config;
pub mod pipeline;

pub use app::Server;
pub use config::{Config, DEFAULT_CONFIG_PATH};
pub use pipeline::AccessPipeline;
