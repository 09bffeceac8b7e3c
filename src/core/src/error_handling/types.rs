use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid configuration value: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures reported by the container runtime collaborator.
#[derive(Debug)]
pub enum RuntimeError {
    NotFound(String),
    InvalidContainerId(String),
    RequestFailed(String),
    UnexpectedStatus { status: u16, message: String },
    DecodeFailed(String),
    UpgradeFailed(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::NotFound(id) => write!(f, "No such container: {}", id),
            RuntimeError::InvalidContainerId(id) => {
                write!(f, "Invalid container identifier: {:?}", id)
            }
            RuntimeError::RequestFailed(e) => write!(f, "Runtime request failed: {}", e),
            RuntimeError::UnexpectedStatus { status, message } => {
                write!(f, "Runtime answered with status {}: {}", status, message)
            }
            RuntimeError::DecodeFailed(e) => write!(f, "Runtime response decode failed: {}", e),
            RuntimeError::UpgradeFailed(e) => write!(f, "Connection upgrade failed: {}", e),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<reqwest::Error> for RuntimeError {
    fn from(err: reqwest::Error) -> Self {
        RuntimeError::RequestFailed(err.to_string())
    }
}

/// Errors raised while demultiplexing the runtime's framed output stream.
#[derive(Debug)]
pub enum FramingError {
    /// The stream ended after `available` header bytes (1..=7).
    TruncatedHeader { available: usize },
    /// The stream ended before the declared payload was complete.
    TruncatedPayload { declared: usize, available: usize },
    Io(std::io::Error),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::TruncatedHeader { available } => {
                write!(f, "truncated frame header ({} of 8 bytes)", available)
            }
            FramingError::TruncatedPayload {
                declared,
                available,
            } => write!(
                f,
                "truncated frame payload ({} of {} bytes)",
                available, declared
            ),
            FramingError::Io(e) => write!(f, "frame read error: {}", e),
        }
    }
}

impl std::error::Error for FramingError {}

impl From<std::io::Error> for FramingError {
    fn from(err: std::io::Error) -> Self {
        FramingError::Io(err)
    }
}

/// Session-scoped setup failures. Each one is reported to the client once
/// through [`SessionError::user_message`] before the session closes.
#[derive(Debug)]
pub enum SessionError {
    ContainerNotFound(RuntimeError),
    ContainerNotRunning,
    ExecCreateFailed(RuntimeError),
    ExecAttachFailed(RuntimeError),
    LogsUnavailable(RuntimeError),
    StatsUnavailable(RuntimeError),
}

impl SessionError {
    /// Text sent to the client before the transport is closed.
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::ContainerNotFound(_) => "Error: Could not find container.",
            SessionError::ContainerNotRunning => "Error: Container is not running.",
            SessionError::ExecCreateFailed(_) => "Error: Failed to create terminal session.",
            SessionError::ExecAttachFailed(_) => "Error: Failed to attach to terminal.",
            SessionError::LogsUnavailable(_) => "Error: Could not retrieve logs for container.",
            SessionError::StatsUnavailable(_) => "Error: Could not get container stats.",
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::ContainerNotFound(e) => write!(f, "Container lookup failed: {}", e),
            SessionError::ContainerNotRunning => write!(f, "Container is not running"),
            SessionError::ExecCreateFailed(e) => write!(f, "Exec creation failed: {}", e),
            SessionError::ExecAttachFailed(e) => write!(f, "Exec attach failed: {}", e),
            SessionError::LogsUnavailable(e) => write!(f, "Log stream unavailable: {}", e),
            SessionError::StatsUnavailable(e) => write!(f, "Stats stream unavailable: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

/// Failures of the client-facing transport.
#[derive(Debug)]
pub enum TransportError {
    /// The endpoint was already closed by this side.
    Closed,
    SendFailed(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "Client transport already closed"),
            TransportError::SendFailed(e) => write!(f, "Client send failed: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

/// A session kind segment that names no known kind.
#[derive(Debug, PartialEq, Eq)]
pub struct UnknownSessionKind(pub String);

impl fmt::Display for UnknownSessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown session kind: {:?}", self.0)
    }
}

impl std::error::Error for UnknownSessionKind {}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_match_client_protocol() {
        let cause = || RuntimeError::RequestFailed("boom".into());
        assert_eq!(
            SessionError::ContainerNotFound(cause()).user_message(),
            "Error: Could not find container."
        );
        assert_eq!(
            SessionError::ContainerNotRunning.user_message(),
            "Error: Container is not running."
        );
        assert_eq!(
            SessionError::ExecCreateFailed(cause()).user_message(),
            "Error: Failed to create terminal session."
        );
        assert_eq!(
            SessionError::ExecAttachFailed(cause()).user_message(),
            "Error: Failed to attach to terminal."
        );
        assert_eq!(
            SessionError::LogsUnavailable(cause()).user_message(),
            "Error: Could not retrieve logs for container."
        );
        assert_eq!(
            SessionError::StatsUnavailable(cause()).user_message(),
            "Error: Could not get container stats."
        );
    }

    #[test]
    fn framing_error_display_mentions_sizes() {
        let e = FramingError::TruncatedPayload {
            declared: 5,
            available: 2,
        };
        assert_eq!(e.to_string(), "truncated frame payload (2 of 5 bytes)");
    }
}
