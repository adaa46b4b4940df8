//! Parsing and validation of `kestrel.toml` router configuration files.
//!
//! This crate reads the router configuration and produces a strongly-typed
//! [`KestrelConfig`] selecting the routability strategy, the negotiation
//! iteration bounds and the wire cost weights.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
