//! Session management core module.
//!
//! A session binds one client transport to one container for one of three purposes
//! (interactive terminal, live logs, live statistics) and is torn down exactly once,
//! whichever side ends first.

use serde::Serialize;

/// Submodule for bidirectional terminal forwarding.
pub mod duplex_pump;
/// Submodule for session data structures.
pub mod session;
/// Submodule for the session lifecycle driver.
pub mod session_manager;
/// Submodule for the client-facing transport endpoint.
pub mod transport;

pub use duplex_pump::{DuplexPump, PumpExit, WorkerEnd};
pub use session::{CloseReason, Session, SessionKind};
pub use session_manager::SessionManager;
pub use transport::{ClientEndpoint, ClientMessage};

/// Lifecycle stage of a session.
///
/// Stages are ordered; a session only ever moves forward and `Closed` is terminal.
///
/// Variants:
/// - `Opening`: the client connected, nothing has been checked yet.
/// - `PreconditionChecked`: the container was found and, for terminals, is running.
/// - `ChannelAcquired`: the remote exec channel or output stream is open.
/// - `Streaming`: bytes are being forwarded.
/// - `Closed`: both sides have been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Opening,
    PreconditionChecked,
    ChannelAcquired,
    Streaming,
    Closed,
}
