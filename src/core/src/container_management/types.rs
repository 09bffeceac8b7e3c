//! Core types used by the container management subsystem.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error_handling::types::RuntimeError;

/// Readable byte cursor over an unbounded remote stream (logs, stats, exec output).
pub type ByteCursor = Box<dyn AsyncRead + Send + Unpin>;

/// Writable byte sink feeding a remote process's stdin.
pub type ByteSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Result of inspecting a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    pub id: String,
    pub running: bool,
}

/// Options for creating a remote exec instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecOptions {
    pub cmd: Vec<String>,
    pub tty: bool,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
}

impl ExecOptions {
    /// Fully attached interactive command with a pseudo-terminal.
    pub fn interactive(cmd: Vec<String>) -> Self {
        Self {
            cmd,
            tty: true,
            attach_stdin: true,
            attach_stdout: true,
            attach_stderr: true,
        }
    }
}

/// Identifies an exec instance created but not yet attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecHandle {
    pub id: String,
    pub container_id: String,
}

/// Options for opening a container's log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub stdout: bool,
    pub stderr: bool,
    pub follow: bool,
    /// Backlog replayed before following: `"all"` or a line count.
    pub tail: String,
}

impl LogOptions {
    /// Both streams, followed indefinitely after `tail` backlog lines.
    pub fn follow_with_tail(tail: impl Into<String>) -> Self {
        Self {
            stdout: true,
            stderr: true,
            follow: true,
            tail: tail.into(),
        }
    }
}

/// Bidirectional byte channel into a remote interactive process.
///
/// The channel is closed once both halves are dropped.
pub struct RemoteChannel {
    /// Process output (stdout and stderr share the pseudo-terminal).
    pub output: ByteCursor,
    /// Process input.
    pub input: ByteSink,
}

impl RemoteChannel {
    pub fn new(output: ByteCursor, input: ByteSink) -> Self {
        Self { output, input }
    }
}

impl std::fmt::Debug for RemoteChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteChannel").finish_non_exhaustive()
    }
}

fn container_id_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,254}$").ok())
        .as_ref()
}

/// Rejects identifiers that are not plain container ids or names, so they can be
/// spliced into request paths verbatim.
pub fn validate_container_id(id: &str) -> Result<&str, RuntimeError> {
    if container_id_pattern().is_some_and(|pattern| pattern.is_match(id)) {
        Ok(id)
    } else {
        Err(RuntimeError::InvalidContainerId(id.to_string()))
    }
}
