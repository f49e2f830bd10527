//! WebSocket message type constants for task status events.
//!
//! Used by the notification relay in `inksketch-api` when forwarding task
//! lifecycle updates to connected WebSocket clients.

/// A task status transition (pending/running/terminal), carrying a
/// serialized [`StatusEvent`](crate::task::StatusEvent) in `data`.
pub const MSG_TYPE_TASK_UPDATE: &str = "task_update";
