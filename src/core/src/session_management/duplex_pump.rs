//! Bidirectional forwarding between a client transport and a remote exec channel.
//!
//! Two workers run concurrently:
//! - inbound: client text messages are written to the remote process input;
//! - outbound: remote output is read in chunks of at most `buffer_size` bytes and
//!   sent to the client as text messages.
//!
//! The first worker to finish ends the session. The coordinator then aborts the
//! other worker, waits for both to be gone and closes the client endpoint, so
//! teardown completes even when one direction is blocked on a read that will never
//! return.

use futures::{Sink, Stream, StreamExt};
use log::{debug, info, trace, warn};
use std::fmt::Display;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::transport::{ClientEndpoint, ClientMessage};
use crate::container_management::types::{ByteCursor, ByteSink, RemoteChannel};

/// Why a single pump worker stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEnd {
    /// The client sent a close frame or its stream ended.
    ClientClosed,
    /// Reading from the client failed.
    ClientError(String),
    /// Writing to the remote process input failed.
    RemoteWriteFailed(String),
    /// The remote process output reached end of stream.
    RemoteEof,
    /// Reading the remote process output failed.
    RemoteReadFailed(String),
    /// Sending to the client failed.
    ClientSendFailed(String),
}

/// Which worker finished first, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    Inbound(WorkerEnd),
    Outbound(WorkerEnd),
}

impl PumpExit {
    pub fn end(&self) -> &WorkerEnd {
        match self {
            PumpExit::Inbound(end) | PumpExit::Outbound(end) => end,
        }
    }
}

/// Forwards one terminal session until either side ends.
#[derive(Debug, Clone, Copy)]
pub struct DuplexPump {
    session_id: Uuid,
    buffer_size: usize,
}

impl DuplexPump {
    pub fn new(session_id: Uuid, buffer_size: usize) -> Self {
        Self {
            session_id,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Runs both workers and returns once the session is fully torn down.
    ///
    /// On return both workers have stopped, the remote channel has been dropped and
    /// `client` has been closed.
    pub async fn run<S, E, K>(
        &self,
        inbound: S,
        client: Arc<ClientEndpoint<K>>,
        channel: RemoteChannel,
    ) -> PumpExit
    where
        S: Stream<Item = Result<ClientMessage, E>> + Send + Unpin + 'static,
        E: Display + Send + 'static,
        K: Sink<String> + Send + Unpin + 'static,
        K::Error: Display,
    {
        let RemoteChannel { output, input } = channel;
        // Single slot: the first finisher wins, later reports are dropped.
        let (done_tx, mut done_rx) = mpsc::channel::<PumpExit>(1);

        let inbound_task = {
            let done = done_tx.clone();
            let session_id = self.session_id;
            tokio::spawn(async move {
                let end = pump_inbound(session_id, inbound, input).await;
                let _ = done.try_send(PumpExit::Inbound(end));
            })
        };
        let outbound_task = {
            let done = done_tx;
            let session_id = self.session_id;
            let buffer_size = self.buffer_size;
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let end = pump_outbound(session_id, buffer_size, output, &client).await;
                let _ = done.try_send(PumpExit::Outbound(end));
            })
        };

        let exit = match done_rx.recv().await {
            Some(exit) => exit,
            // Both senders dropped without reporting: a worker panicked.
            None => PumpExit::Outbound(WorkerEnd::RemoteReadFailed(String::from(
                "pump worker terminated unexpectedly",
            ))),
        };
        debug!("[{}] Pump finishing: {:?}", self.session_id, exit);

        inbound_task.abort();
        outbound_task.abort();
        let _ = inbound_task.await;
        let _ = outbound_task.await;

        client.close().await;
        info!("[{}] Terminal session torn down", self.session_id);
        exit
    }
}

async fn pump_inbound<S, E>(session_id: Uuid, mut inbound: S, mut input: ByteSink) -> WorkerEnd
where
    S: Stream<Item = Result<ClientMessage, E>> + Unpin,
    E: Display,
{
    let end = loop {
        match inbound.next().await {
            Some(Ok(ClientMessage::Text(text))) => {
                trace!("[{}] client forwarding {} bytes", session_id, text.len());
                if let Err(e) = input.write_all(text.as_bytes()).await {
                    warn!("[{}] Remote input write failed: {}", session_id, e);
                    break WorkerEnd::RemoteWriteFailed(e.to_string());
                }
                if let Err(e) = input.flush().await {
                    break WorkerEnd::RemoteWriteFailed(e.to_string());
                }
            }
            Some(Ok(ClientMessage::Close)) | None => {
                debug!("[{}] client disconnected", session_id);
                break WorkerEnd::ClientClosed;
            }
            Some(Ok(ClientMessage::Binary(_))) | Some(Ok(ClientMessage::Other)) => continue,
            Some(Err(e)) => {
                debug!("[{}] client read failed: {}", session_id, e);
                break WorkerEnd::ClientError(e.to_string());
            }
        }
    };
    // Signal end of input to the remote process.
    let _ = input.shutdown().await;
    end
}

async fn pump_outbound<K>(
    session_id: Uuid,
    buffer_size: usize,
    mut output: ByteCursor,
    client: &ClientEndpoint<K>,
) -> WorkerEnd
where
    K: Sink<String> + Unpin,
    K::Error: Display,
{
    let mut buffer = vec![0u8; buffer_size];
    let mut pending: Vec<u8> = Vec::new();
    loop {
        match output.read(&mut buffer).await {
            Ok(0) => {
                debug!("[{}] remote output closed", session_id);
                if !pending.is_empty() {
                    let rest = String::from_utf8_lossy(&pending).into_owned();
                    let _ = client.send_text(rest).await;
                }
                return WorkerEnd::RemoteEof;
            }
            Ok(n) => {
                trace!("[{}] container forwarding {} bytes", session_id, n);
                pending.extend_from_slice(&buffer[..n]);
                let text = take_complete_text(&mut pending);
                if text.is_empty() {
                    continue;
                }
                if let Err(e) = client.send_text(text).await {
                    debug!("[{}] client send failed: {}", session_id, e);
                    return WorkerEnd::ClientSendFailed(e.to_string());
                }
            }
            Err(e) => {
                warn!("[{}] Remote output read failed: {}", session_id, e);
                return WorkerEnd::RemoteReadFailed(e.to_string());
            }
        }
    }
}

/// Drains `pending` up to the last complete UTF-8 sequence and returns it as text.
///
/// A multi-byte character cut by a read boundary stays in `pending` for the next
/// chunk. Invalid bytes elsewhere are replaced.
fn take_complete_text(pending: &mut Vec<u8>) -> String {
    let keep = incomplete_tail_len(pending);
    let tail = pending.split_off(pending.len() - keep);
    match String::from_utf8(std::mem::replace(pending, tail)) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

/// Length of a trailing, not yet complete, UTF-8 sequence (0..=3).
fn incomplete_tail_len(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(4) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            b if b & 0x80 == 0x00 => 1,
            b if b & 0xE0 == 0xC0 => 2,
            b if b & 0xF0 == 0xE0 => 3,
            b if b & 0xF8 == 0xF0 => 4,
            _ => return 0,
        };
        return if needed > back { back } else { 0 };
    }
    0
}
