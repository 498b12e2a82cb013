//! WebSocket connection lifecycle: greeting, read loop, writer task.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::session::SessionOrchestrator;
use crate::state::GatewayState;

/// Handle a new WebSocket connection until the client leaves.
///
/// Frames are processed one at a time; the next frame is not read until the
/// current photo has been fully handled.
pub async fn handle_ws_connection(state: Arc<GatewayState>, ws: WebSocket, peer: SocketAddr) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, %peer, "New WebSocket connection");

    let (mut ws_tx, mut ws_rx) = ws.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<String>();

    state.register(&conn_id, peer).await;
    #[cfg(feature = "metrics")]
    crate::metrics::record_session_open();

    // Writer task: frames leave in the order they were queued.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = event_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = SessionOrchestrator::new(state.pipeline.clone(), conn_id.clone(), event_tx);
    session.greet();

    while let Some(msg_result) = ws_rx.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let outcome = session.handle_message(text.as_str()).await;
                debug!(conn_id = %conn_id, outcome = outcome.as_str(), "Message handled");
            }
            Ok(Message::Binary(data)) => {
                debug!(conn_id = %conn_id, len = data.len(), "Ignoring binary frame");
            }
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "Client requested close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, %e, "WebSocket error");
                break;
            }
            // Axum answers protocol pings itself.
            _ => {}
        }
    }

    drop(session);
    send_task.abort();
    cleanup_connection(&state, &conn_id).await;
}

async fn cleanup_connection(state: &GatewayState, conn_id: &str) {
    match state.unregister(conn_id).await {
        Some(info) => info!(
            conn_id = %info.conn_id,
            peer = %info.peer,
            duration_secs = info.duration_secs(Utc::now()),
            "WebSocket connection closed"
        ),
        None => info!(conn_id = %conn_id, "WebSocket connection closed"),
    }
    #[cfg(feature = "metrics")]
    crate::metrics::record_session_close();
}
