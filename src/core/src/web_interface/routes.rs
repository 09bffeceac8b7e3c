use futures::{future, SinkExt, StreamExt};
use log::{debug, info};
use std::sync::Arc;
use warp::ws::{Message, WebSocket, Ws};
use warp::{reply, Filter, Rejection, Reply};

use super::types::{client_message, HealthResponse};
use crate::session_management::{SessionKind, SessionManager};

/// GET /health
pub fn health_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| reply::json(&HealthResponse { status: "ok" }))
}

/// GET /ws/:kind/:container_id
///
/// Unknown kinds never match, so they are rejected before the upgrade.
pub fn session_route(
    session_manager: Arc<SessionManager>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("ws" / SessionKind / String)
        .and(warp::get())
        .and(warp::ws())
        .map(move |kind: SessionKind, container_id: String, ws: Ws| {
            let session_manager = session_manager.clone();
            debug!("Upgrading {} session request for {}", kind, container_id);
            ws.on_upgrade(move |socket| {
                handle_socket(socket, kind, container_id, session_manager)
            })
        })
}

async fn handle_socket(
    socket: WebSocket,
    kind: SessionKind,
    container_id: String,
    session_manager: Arc<SessionManager>,
) {
    let (sender, receiver) = socket.split();
    let inbound = receiver.map(|frame| frame.map(client_message));
    let outbound =
        sender.with(|text: String| future::ready(Ok::<Message, warp::Error>(Message::text(text))));

    let session = session_manager
        .serve(&container_id, kind, inbound, outbound)
        .await;
    info!(
        "[{}] {} session for {} lasted {}s",
        session.id,
        kind,
        container_id,
        session
            .closed_at
            .map(|end| (end - session.opened_at).num_seconds())
            .unwrap_or_default()
    );
}
