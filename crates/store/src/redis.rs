//! Redis-backed [`TaskStore`].
//!
//! Commands go over a [`MultiplexedConnection`] (cheap to clone, all clones
//! share one TCP connection). Pub/sub needs a dedicated connection, so
//! [`RedisStore::connect`] spawns an event pump that `PSUBSCRIBE`s to
//! `task_updates:*` and re-broadcasts every parsed [`StatusEvent`] on a
//! local `tokio::sync::broadcast` channel. Subscribers therefore see the
//! same interface whether the store is Redis or in-memory.

use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use futures::StreamExt;
use inksketch_core::{StatusEvent, TaskRecord};
use tokio::sync::broadcast;

use crate::error::StoreError;
use crate::keys::{task_key, topic, TASK_KEY_PREFIX, TASK_TTL_SECS, TOPIC_PATTERN};
use crate::store::TaskStore;

/// Buffer capacity for the status-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Delay before the event pump retries a lost pub/sub connection.
const PUMP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Production task store backed by Redis.
pub struct RedisStore {
    conn: MultiplexedConnection,
    event_tx: broadcast::Sender<StatusEvent>,
    pump: tokio::task::JoinHandle<()>,
}

impl RedisStore {
    /// Connect to Redis at `url` (`redis://[:<password>@]<host>:<port>[/<db>]`).
    ///
    /// Fails fast if the command connection cannot be established. The
    /// pub/sub pump is spawned here and reconnects on its own if the
    /// subscription connection drops.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)
            .map_err(|e| StoreError::Connection(format!("invalid Redis URL: {e}")))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(format!("failed to connect to Redis: {e}")))?;

        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let pump = tokio::spawn(run_event_pump(client, event_tx.clone()));

        Ok(Self {
            conn,
            event_tx,
            pump,
        })
    }
}

impl Drop for RedisStore {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[async_trait]
impl TaskStore for RedisStore {
    async fn put(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let key = task_key(&record.id);
        let json = serde_json::to_string(record)?;

        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(&key, json, TASK_TTL_SECS)
            .await
            .map_err(|e| map_redis_error(e, &key))
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        let key = task_key(task_id);

        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await.map_err(|e| map_redis_error(e, &key))?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn scan(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let pattern = format!("{TASK_KEY_PREFIX}*");

        let mut conn = self.conn.clone();
        let keys: Vec<String> = ::redis::cmd("KEYS")
            .arg(&pattern)
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error(e, &pattern))?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            // A key may expire between KEYS and GET; skip silently.
            let raw: Option<String> =
                conn.get(&key).await.map_err(|e| map_redis_error(e, &key))?;
            if let Some(json) = raw {
                match serde_json::from_str(&json) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        tracing::warn!(%key, error = %e, "Skipping malformed task record");
                    }
                }
            }
        }
        Ok(records)
    }

    async fn publish(&self, event: &StatusEvent) -> Result<(), StoreError> {
        let channel = topic(&event.task_id);
        let json = serde_json::to_string(event)?;

        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(&channel, json)
            .await
            .map_err(|e| map_redis_error(e, &channel))
    }

    fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.event_tx.subscribe()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        ::redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| map_redis_error(e, "PING"))
    }
}

/// Pub/sub pump: subscribe to the wildcard topic and re-broadcast every
/// event locally. Reconnects with a fixed delay if the connection drops.
async fn run_event_pump(client: Client, event_tx: broadcast::Sender<StatusEvent>) {
    loop {
        let mut pubsub = match client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(e) => {
                tracing::warn!(error = %e, "Pub/sub connection failed, retrying");
                tokio::time::sleep(PUMP_RETRY_DELAY).await;
                continue;
            }
        };

        if let Err(e) = pubsub.psubscribe(TOPIC_PATTERN).await {
            tracing::warn!(error = %e, pattern = TOPIC_PATTERN, "PSUBSCRIBE failed, retrying");
            tokio::time::sleep(PUMP_RETRY_DELAY).await;
            continue;
        }
        tracing::info!(pattern = TOPIC_PATTERN, "Subscribed to task status events");

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping unreadable pub/sub message");
                    continue;
                }
            };

            match serde_json::from_str::<StatusEvent>(&payload) {
                Ok(event) => {
                    // A SendError only means there are zero subscribers.
                    let _ = event_tx.send(event);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed status event");
                }
            }
        }

        tracing::warn!("Pub/sub stream ended, reconnecting");
        tokio::time::sleep(PUMP_RETRY_DELAY).await;
    }
}

/// Map a Redis error to a [`StoreError::Backend`] with key context.
fn map_redis_error(err: ::redis::RedisError, key: &str) -> StoreError {
    StoreError::Backend(format!("Redis error for {key}: {err}"))
}
