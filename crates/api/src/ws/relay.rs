//! Per-connection notification relay.
//!
//! Lifecycle per connection: connecting -> authenticated -> relaying ->
//! closed. The caller must present a bearer token before the connection is
//! registered; while relaying, the loop races "next task status event"
//! against "next client frame" with `tokio::select!` (no polling interval),
//! and either side ending drives the full cleanup: deregistration from the
//! registry and dropping the event subscription.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use inksketch_core::task_events::MSG_TYPE_TASK_UPDATE;
use inksketch_core::types::UserId;
use inksketch_core::StatusEvent;
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use crate::auth::verify_credential;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// How long teardown waits for the sender task to flush queued frames
/// (a final Close in particular) before aborting it.
const SENDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Query parameters accepted by the WebSocket endpoint.
///
/// Usage: `ws://host/api/v1/ws?token=<jwt>`.
#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| relay_connection(socket, state, query.token))
}

/// Manage a single WebSocket connection after upgrade.
///
/// 1. Authenticates the caller; failure closes with a policy-violation
///    code before anything is registered, so there is nothing to clean up.
/// 2. Subscribes to the status-event channel and registers with the
///    connection registry.
/// 3. Spawns a sender task draining the per-connection channel, then
///    relays events until either side terminates.
/// 4. Deregisters and drops the subscription on every exit path.
async fn relay_connection(mut socket: WebSocket, state: AppState, token: Option<String>) {
    let user_id = match token
        .as_deref()
        .ok_or(())
        .and_then(|t| verify_credential(t, &state.config.jwt).map_err(|_| ()))
    {
        Ok(user_id) => user_id,
        Err(()) => {
            tracing::warn!("WebSocket rejected: missing or invalid credential");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "authentication required".into(),
                })))
                .await;
            return;
        }
    };

    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, user_id = %user_id, "WebSocket connected");

    // Subscribe before registering so no event published after
    // registration can be missed.
    let events = state.store.subscribe();

    let (tx, mut rx) = mpsc::unbounded_channel();
    state
        .ws_manager
        .connect(conn_id.clone(), user_id.clone(), tx.clone())
        .await;

    let (mut sink, stream) = socket.split();

    // Sender task: forward registry-channel messages to the socket sink.
    let sender_conn_id = conn_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    if let Err(reason) = relay_loop(&state.ws_manager, &user_id, events, stream).await {
        tracing::error!(conn_id = %conn_id, reason, "Relay failed");
        let _ = tx.send(Message::Close(Some(CloseFrame {
            code: close_code::ERROR,
            reason: "internal error".into(),
        })));
    }

    // Scoped cleanup: runs whether the client disconnected, the transport
    // failed, or the relay itself errored. The event subscription was
    // consumed by the loop and is already dropped. Removing the registry
    // entry and dropping our own sender closes the channel, so the sender
    // task drains whatever is still queued (a final Close in particular)
    // and exits; abort is the fallback for a sink that will not flush.
    state.ws_manager.disconnect(&conn_id).await;
    drop(tx);
    if tokio::time::timeout(SENDER_DRAIN_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
    tracing::info!(conn_id = %conn_id, user_id = %user_id, "WebSocket disconnected");
}

/// The relaying state: race status events against client frames.
///
/// Returns `Ok(())` for a normal client-side close (or transport error,
/// treated identically) and `Err` only for an internal relay failure.
async fn relay_loop(
    ws_manager: &Arc<WsManager>,
    user_id: &UserId,
    mut events: broadcast::Receiver<StatusEvent>,
    mut stream: futures::stream::SplitStream<WebSocket>,
) -> Result<(), &'static str> {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => forward_event(ws_manager, user_id, &event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Clients recover current state by re-reading the
                    // record, so lag is survivable.
                    tracing::warn!(user_id = %user_id, skipped, "Relay lagged behind event channel");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err("status event channel closed");
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(_))) | None => {
                    return Ok(());
                }
                Some(Ok(_)) => {
                    // Inbound frames are only a liveness signal.
                }
                Some(Err(e)) => {
                    tracing::debug!(user_id = %user_id, error = %e, "WebSocket receive error");
                    return Ok(());
                }
            },
        }
    }
}

/// Wrap a status event in the client frame shape and deliver it to the
/// connection's owning user.
async fn forward_event(ws_manager: &Arc<WsManager>, user_id: &str, event: &StatusEvent) {
    let frame = serde_json::json!({
        "type": MSG_TYPE_TASK_UPDATE,
        "data": event,
    });
    ws_manager
        .send_to_user(user_id, Message::Text(frame.to_string().into()))
        .await;
}
