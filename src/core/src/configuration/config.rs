use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Args;
use log::debug;
use serde::Deserialize;
use std::path::Path;

/// Application configuration structure that defines all runtime parameters.
///
/// The configuration is loaded from a TOML file through [`Config::from_file`]; missing keys
/// fall back to their defaults. Command-line flags collected in [`CliOverrides`] are applied
/// on top of it before [`Config::validate`] runs.
///
/// # Examples
///
/// ```
/// use dockgate::configuration::Config;
///
/// let config = Config::from_toml_str("port = 9000").unwrap();
/// assert_eq!(config.port, 9000);
/// assert_eq!(config.session.log_tail, "100");
/// ```
///
/// # Fields Overview
///
/// - `bind_address`: address the HTTP/websocket server binds to
/// - `port`: port the HTTP/websocket server listens on
/// - `runtime`: how to reach the container runtime's Engine API
/// - `session`: per-session tunables (log backlog, shell, pump buffer)
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub runtime: RuntimeConfig,
    pub session: SessionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: String::from("0.0.0.0"),
            port: 8080,
            runtime: RuntimeConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Command-line overrides applied on top of the configuration file.
#[derive(Args, Debug, Clone, Default)]
pub struct CliOverrides {
    /// Network address to bind the server to.
    #[arg(long)]
    pub bind_address: Option<String>,

    /// Port the server listens on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Base URL of the container runtime's Engine API.
    #[arg(long, env = "DOCKER_ENGINE_URL")]
    pub runtime_endpoint: Option<String>,
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies command-line overrides and re-validates the result.
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Result<Self, ConfigError> {
        if let Some(addr) = &overrides.bind_address {
            self.bind_address = addr.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(endpoint) = &overrides.runtime_endpoint {
            self.runtime.endpoint = endpoint.clone();
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "bind_address {:?} is not an IP address",
                self.bind_address
            )));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port must not be 0".into()));
        }

        let endpoint = self.runtime.endpoint.trim();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(format!(
                "runtime.endpoint {:?} must be an http:// or https:// URL",
                self.runtime.endpoint
            )));
        }
        if let Some(version) = &self.runtime.api_version {
            if version.is_empty() || version.contains('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "runtime.api_version {:?} is not a version segment",
                    version
                )));
            }
        }

        validate_shell("session.preferred_shell", &self.session.preferred_shell)?;
        validate_shell("session.fallback_shell", &self.session.fallback_shell)?;

        if self.session.pump_buffer_size == 0 {
            return Err(ConfigError::InvalidValue(
                "session.pump_buffer_size must be greater than 0".into(),
            ));
        }
        let tail = self.session.log_tail.as_str();
        if tail != "all" && tail.parse::<u64>().is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "session.log_tail {:?} must be \"all\" or a line count",
                tail
            )));
        }
        Ok(())
    }
}

// Shell paths are interpolated into a `sh -c` script.
fn validate_shell(field: &str, shell: &str) -> Result<(), ConfigError> {
    let safe = shell.starts_with('/')
        && !shell
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '`' | '$' | ';' | '\\'));
    if safe {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue(format!(
            "{} {:?} must be an absolute path without quoting or whitespace",
            field, shell
        )))
    }
}
