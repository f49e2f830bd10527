use async_trait::async_trait;
use inksketch_core::{StatusEvent, TaskRecord};
use tokio::sync::broadcast;

use crate::error::StoreError;

/// Combined task-record store and status-event channel.
///
/// The scheduler is the only writer of records; everything else reads.
/// Implementations must guarantee that a `put` completed before a `publish`
/// is visible to any subscriber that re-reads the record in reaction to the
/// published event.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Write a record under `task:<id>`, resetting its 24 h TTL.
    async fn put(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Point read of a record. `None` if absent or expired.
    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError>;

    /// Full scan over `task:*`.
    ///
    /// Acceptable for the bounded task volume this subsystem targets
    /// (concurrency-limited submissions, 24 h retention); not meant to
    /// scale to millions of records. No ordering guarantee.
    async fn scan(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// Publish a status event on `task_updates:<task_id>`.
    async fn publish(&self, event: &StatusEvent) -> Result<(), StoreError>;

    /// Subscribe to every status event (wildcard topic).
    ///
    /// Events published before the subscription are never replayed; a late
    /// subscriber recovers current state via [`get`](TaskStore::get).
    fn subscribe(&self) -> broadcast::Receiver<StatusEvent>;

    /// Liveness probe, used by the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}
