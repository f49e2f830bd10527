//! WebSocket infrastructure for real-time task notifications.
//!
//! Provides the user-keyed connection registry, the per-connection
//! notification relay, heartbeat monitoring, and the HTTP upgrade handler
//! used by Axum routes.

mod heartbeat;
pub mod manager;
mod relay;

pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
pub use relay::ws_handler;
