//! In-memory [`TaskStore`] used by tests and store-less local development.
//!
//! Records live in a `RwLock<HashMap>` with a per-key deadline that mimics
//! the sliding 24 h TTL; events fan out over a `tokio::sync::broadcast`
//! channel, so the subscription side behaves exactly like the Redis pump.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use inksketch_core::{StatusEvent, TaskRecord};
use tokio::sync::{broadcast, RwLock};

use crate::error::StoreError;
use crate::keys::{task_key, TASK_KEY_PREFIX, TASK_TTL_SECS};
use crate::store::TaskStore;

/// Buffer capacity for the status-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Thread-safe in-memory store with TTL emulation.
pub struct MemoryStore {
    records: RwLock<HashMap<String, (TaskRecord, Instant)>>,
    event_tx: broadcast::Sender<StatusEvent>,
    ttl: Duration,
}

impl MemoryStore {
    /// Create an empty store with the standard 24 h retention window.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            records: RwLock::new(HashMap::new()),
            event_tx,
            ttl: Duration::from_secs(TASK_TTL_SECS),
        }
    }

    /// Override the retention window (builder pattern, for TTL tests).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Number of live (unexpired) records.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.records
            .read()
            .await
            .values()
            .filter(|(_, deadline)| *deadline > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn put(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let deadline = Instant::now() + self.ttl;
        self.records
            .write()
            .await
            .insert(task_key(&record.id), (record.clone(), deadline));
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let key = task_key(task_id);
        let records = self.records.read().await;
        match records.get(&key) {
            Some((record, deadline)) if *deadline > Instant::now() => Ok(Some(record.clone())),
            // Expired entries are dropped lazily on the next scan.
            _ => Ok(None),
        }
    }

    async fn scan(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let now = Instant::now();
        let mut records = self.records.write().await;
        records.retain(|_, (_, deadline)| *deadline > now);
        Ok(records
            .iter()
            .filter(|(key, _)| key.starts_with(TASK_KEY_PREFIX))
            .map(|(_, (record, _))| record.clone())
            .collect())
    }

    async fn publish(&self, event: &StatusEvent) -> Result<(), StoreError> {
        // A SendError only means there are zero subscribers right now.
        let _ = self.event_tx.send(event.clone());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.event_tx.subscribe()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
