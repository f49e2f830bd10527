//! Integration tests for the WebSocket notification relay.
//!
//! These tests bind the full router to an ephemeral listener and drive a
//! real WebSocket client against it, covering the connection contract:
//! policy close on missing/invalid credentials, event delivery framing,
//! registry cleanup on client close, and the internal-error close path.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use inksketch_api::auth::jwt::generate_access_token;
use inksketch_api::state::AppState;
use inksketch_core::{StatusEvent, TaskRecord, TaskStatus};
use inksketch_store::{MemoryStore, StoreError, TaskStore};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Generous ceiling for waits; individual tests finish far sooner.
const WAIT_CEILING: Duration = Duration::from_secs(5);

/// Serve the app on an ephemeral local port.
async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Open a WebSocket connection, optionally presenting a bearer token.
async fn connect(addr: SocketAddr, token: Option<&str>) -> WsClient {
    let url = match token {
        Some(token) => format!("ws://{addr}/api/v1/ws?token={token}"),
        None => format!("ws://{addr}/api/v1/ws"),
    };
    let (socket, _response) = tokio_tungstenite::connect_async(url)
        .await
        .expect("WebSocket handshake should succeed");
    socket
}

/// Mint a valid access token for `user_id` against the test config.
fn token_for(state: &AppState, user_id: &str) -> String {
    generate_access_token(user_id, &state.config.jwt).unwrap()
}

/// Read frames until a Close arrives and assert its code.
async fn expect_close(socket: &mut WsClient, wanted: CloseCode) {
    loop {
        let frame = tokio::time::timeout(WAIT_CEILING, socket.next())
            .await
            .expect("timed out waiting for Close frame");
        match frame {
            Some(Ok(Message::Close(Some(close)))) => {
                assert_eq!(close.code, wanted, "unexpected close code: {close:?}");
                return;
            }
            // Anything else (e.g. a Ping) is not the frame we are after.
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("transport error while waiting for Close: {e}"),
            None => panic!("stream ended without a Close frame"),
        }
    }
}

/// Poll the registry until it holds `wanted` connections.
async fn wait_for_connection_count(state: &AppState, wanted: usize) {
    let deadline = tokio::time::Instant::now() + WAIT_CEILING;
    loop {
        if state.ws_manager.connection_count().await == wanted {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "registry never reached {wanted} connections"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Test: connecting without a token is closed with the policy code (1008)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_token_is_closed_with_policy_code() {
    let (app, state) = common::build_test_app();
    let addr = serve(app).await;

    let mut socket = connect(addr, None).await;
    expect_close(&mut socket, CloseCode::Policy).await;

    // The connection was refused before registration.
    assert_eq!(state.ws_manager.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: an invalid token is treated the same as a missing one
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_token_is_closed_with_policy_code() {
    let (app, state) = common::build_test_app();
    let addr = serve(app).await;

    let mut socket = connect(addr, Some("not.a.token")).await;
    expect_close(&mut socket, CloseCode::Policy).await;

    assert_eq!(state.ws_manager.connection_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: a published status event reaches the client as a task_update frame
// ---------------------------------------------------------------------------

#[tokio::test]
async fn published_event_reaches_client_as_task_update() {
    let (app, state) = common::build_test_app();
    let addr = serve(app).await;

    let token = token_for(&state, "user-1");
    let mut socket = connect(addr, Some(&token)).await;
    wait_for_connection_count(&state, 1).await;

    // The relay subscribes before registering, so an event published once
    // the connection is visible in the registry must be delivered.
    let mut record = TaskRecord::new("t-relay-1".to_string(), "sketch_conversion", 30);
    record.status = TaskStatus::Running;
    state
        .store
        .publish(&StatusEvent::from_record(&record))
        .await
        .unwrap();

    let frame = tokio::time::timeout(WAIT_CEILING, socket.next())
        .await
        .expect("timed out waiting for task_update frame")
        .expect("stream should stay open")
        .expect("frame should be readable");

    let Message::Text(text) = frame else {
        panic!("expected a Text frame, got: {frame:?}");
    };
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["type"], "task_update");
    assert_eq!(json["data"]["task_id"], "t-relay-1");
    assert_eq!(json["data"]["status"], "running");
}

// ---------------------------------------------------------------------------
// Test: client-initiated close deregisters the connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_close_deregisters_connection() {
    let (app, state) = common::build_test_app();
    let addr = serve(app).await;

    let token = token_for(&state, "user-1");
    let mut socket = connect(addr, Some(&token)).await;
    wait_for_connection_count(&state, 1).await;

    socket.close(None).await.unwrap();

    wait_for_connection_count(&state, 0).await;
}

// ---------------------------------------------------------------------------
// Test: an internal relay failure closes with the error code (1011)
// ---------------------------------------------------------------------------

/// Store whose event channel has already shut down: every subscription
/// observes a closed channel immediately, which the relay treats as an
/// internal failure.
struct ClosedEventsStore {
    inner: MemoryStore,
}

#[async_trait]
impl TaskStore for ClosedEventsStore {
    async fn put(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.inner.put(record).await
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        self.inner.get(task_id).await
    }

    async fn scan(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.inner.scan().await
    }

    async fn publish(&self, event: &StatusEvent) -> Result<(), StoreError> {
        self.inner.publish(event).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        let (tx, rx) = broadcast::channel(1);
        drop(tx);
        rx
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn relay_failure_is_closed_with_internal_error_code() {
    let store = Arc::new(ClosedEventsStore {
        inner: MemoryStore::new(),
    });
    let (app, state) = common::build_test_app_with_store(store);
    let addr = serve(app).await;

    let token = token_for(&state, "user-1");
    let mut socket = connect(addr, Some(&token)).await;

    // The Close frame must actually arrive, not merely be queued behind a
    // sender task that teardown kills first.
    expect_close(&mut socket, CloseCode::Error).await;

    wait_for_connection_count(&state, 0).await;
}
