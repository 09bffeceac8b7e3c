//! Gateway configuration.
//!
//! [`Config`] is read from a TOML file and can be partially overridden from the
//! command line. Every field has a default so an empty file is a valid configuration.

pub mod config;
pub mod types;

pub use config::Config;
pub use types::{RuntimeConfig, SessionConfig};
