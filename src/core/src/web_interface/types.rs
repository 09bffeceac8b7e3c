use serde::Serialize;
use warp::ws::Message;

use crate::session_management::ClientMessage;

/// API error payload
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Maps a WebSocket frame onto the transport-neutral client message.
pub fn client_message(message: Message) -> ClientMessage {
    if message.is_text() {
        match message.to_str() {
            Ok(text) => ClientMessage::Text(text.to_owned()),
            Err(_) => ClientMessage::Other,
        }
    } else if message.is_binary() {
        ClientMessage::Binary(message.as_bytes().to_vec())
    } else if message.is_close() {
        ClientMessage::Close
    } else {
        ClientMessage::Other
    }
}
