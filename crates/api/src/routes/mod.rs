pub mod health;
pub mod tasks;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                       WebSocket (task status notifications)
///
/// /tasks                    list tasks (optional ?status= filter)
/// /tasks/{id}               get a single task record
/// /tasks/{id}/cancel        cancel a pending or running task (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/tasks", tasks::router())
}
