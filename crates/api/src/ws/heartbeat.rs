use std::sync::Arc;
use std::time::Duration;

use crate::ws::manager::WsManager;

/// Spawn a background task that sends a Ping frame to every registered
/// connection once per `period`.
///
/// Pings double as liveness probes: a connection whose channel has closed is
/// pruned on the next delivery attempt. Ticks with an empty registry are
/// skipped. The returned `JoinHandle` is used to abort the task during
/// shutdown.
pub fn start_heartbeat(ws_manager: Arc<WsManager>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;
            let count = ws_manager.connection_count().await;
            if count == 0 {
                continue;
            }
            tracing::debug!(count, "WebSocket heartbeat ping");
            ws_manager.ping_all().await;
        }
    })
}
