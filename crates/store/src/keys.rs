//! Key and topic conventions shared by every store implementation.

/// Prefix for persisted task records.
pub const TASK_KEY_PREFIX: &str = "task:";

/// Prefix for per-task status-event topics.
pub const TOPIC_PREFIX: &str = "task_updates:";

/// Wildcard pattern matching every status-event topic.
pub const TOPIC_PATTERN: &str = "task_updates:*";

/// Retention window for task records, reset on every write.
pub const TASK_TTL_SECS: u64 = 24 * 60 * 60;

/// Storage key for a task record.
pub fn task_key(task_id: &str) -> String {
    format!("{TASK_KEY_PREFIX}{task_id}")
}

/// Pub/sub topic for a task's status events.
pub fn topic(task_id: &str) -> String {
    format!("{TOPIC_PREFIX}{task_id}")
}
