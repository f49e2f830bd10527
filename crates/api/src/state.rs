use std::sync::Arc;

use inksketch_store::TaskStore;
use inksketch_tasks::TaskScheduler;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Everything is behind `Arc`, so cloning is cheap. The orchestrator pieces
/// (store, scheduler, registry) are constructed once in `main` and injected
/// here -- there is no ambient global instance.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Task record store + notification channel.
    pub store: Arc<dyn TaskStore>,
    /// Task scheduler (bounded-concurrency execution).
    pub scheduler: Arc<TaskScheduler>,
    /// WebSocket connection registry.
    pub ws_manager: Arc<WsManager>,
}
