use futures::{Sink, SinkExt};
use log::debug;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use crate::error_handling::types::TransportError;

/// A frame received from the client, independent of the transport carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Text(String),
    Binary(Vec<u8>),
    /// The client asked to close the connection.
    Close,
    /// Control traffic such as pings.
    Other,
}

/// Writable half of a client connection, shared by every task of a session.
///
/// Everything the gateway sends to a client is text, so the sink takes plain
/// strings and the transport adapter decides how to frame them.
///
/// Sends are serialized through an async mutex. Closing is idempotent: the first
/// caller closes the underlying sink, later callers and later sends are no-ops
/// that report [`TransportError::Closed`].
pub struct ClientEndpoint<K> {
    sink: Mutex<K>,
    closed: AtomicBool,
}

impl<K> ClientEndpoint<K>
where
    K: Sink<String> + Unpin,
    K::Error: Display,
{
    pub fn new(sink: K) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends one text message.
    pub async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut sink = self.sink.lock().await;
        sink.send(text)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Closes the sink. Returns `true` only for the call that actually closed it.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!("Client transport close reported: {}", e);
        }
        true
    }
}
