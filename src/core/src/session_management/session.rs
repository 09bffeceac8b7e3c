use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::duplex_pump::{PumpExit, WorkerEnd};
use super::SessionState;
use crate::error_handling::types::UnknownSessionKind;

/// What a session streams. Closed set; unknown kinds are rejected at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Terminal,
    Logs,
    Stats,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Terminal => "terminal",
            SessionKind::Logs => "logs",
            SessionKind::Stats => "stats",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = UnknownSessionKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "terminal" => Ok(SessionKind::Terminal),
            "logs" => Ok(SessionKind::Logs),
            "stats" => Ok(SessionKind::Stats),
            other => Err(UnknownSessionKind(other.to_string())),
        }
    }
}

/// Why a session was torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    /// Setup failed; the client was sent this message.
    SetupFailed(&'static str),
    /// The remote stream ended normally.
    RemoteEnded,
    /// The remote side failed mid-stream.
    RemoteFailed(String),
    /// The client disconnected or could no longer be written to.
    ClientGone,
}

impl From<PumpExit> for CloseReason {
    fn from(exit: PumpExit) -> Self {
        match exit.end() {
            WorkerEnd::RemoteEof => CloseReason::RemoteEnded,
            WorkerEnd::RemoteReadFailed(e) | WorkerEnd::RemoteWriteFailed(e) => {
                CloseReason::RemoteFailed(e.clone())
            }
            WorkerEnd::ClientClosed | WorkerEnd::ClientError(_) | WorkerEnd::ClientSendFailed(_) => {
                CloseReason::ClientGone
            }
        }
    }
}

/// One client connection bound to one container.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub container_id: String,
    pub kind: SessionKind,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    state: SessionState,
    close_reason: Option<CloseReason>,
}

impl Session {
    pub fn new(container_id: impl Into<String>, kind: SessionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            container_id: container_id.into(),
            kind,
            opened_at: Utc::now(),
            closed_at: None,
            state: SessionState::Opening,
            close_reason: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Moves to `next` if it lies strictly ahead of the current state.
    ///
    /// `Closed` is only reachable through [`Session::close`]. Returns whether the
    /// state changed.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if next == SessionState::Closed || next <= self.state {
            return false;
        }
        self.state = next;
        true
    }

    /// Closes the session. Only the first call has an effect.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if self.is_closed() {
            return false;
        }
        self.state = SessionState::Closed;
        self.closed_at = Some(Utc::now());
        self.close_reason = Some(reason);
        true
    }
}
