//! Task lifecycle state machine and record shapes.
//!
//! A task moves through `pending -> running -> {completed | failed |
//! timeout | cancelled}`. The four right-hand statuses are terminal. A task
//! cancelled before the concurrency gate admits it settles directly
//! `pending -> cancelled` without ever running.

use serde::{Deserialize, Serialize};

use crate::types::{TaskId, Timestamp};

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Recorded, waiting for a concurrency slot.
    Pending,
    /// Admitted by the concurrency gate, payload executing.
    Running,
    /// Payload returned normally.
    Completed,
    /// Payload returned an error (message captured on the record).
    Failed,
    /// Payload did not settle within its configured timeout.
    Timeout,
    /// Cancellation was requested and honoured.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    /// Whether the lifecycle graph permits moving from `self` to `next`.
    ///
    /// `Pending` may move to `Running` or directly to `Cancelled`;
    /// `Running` may move to any terminal status; terminal statuses are
    /// absorbing.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => matches!(next, TaskStatus::Running | TaskStatus::Cancelled),
            TaskStatus::Running => next.is_terminal(),
            _ => false,
        }
    }

    /// Stable lowercase name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TaskRecord
// ---------------------------------------------------------------------------

/// Persisted task metadata, stored as JSON under `task:<id>`.
///
/// Created and mutated exclusively by the scheduler; read by anyone holding
/// the task id. Expires from the store 24 hours after the last write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Opaque task identifier, globally unique within the retention window.
    pub id: TaskId,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// When the task was submitted (UTC).
    pub created_at: Timestamp,

    /// When the record was last written (UTC).
    pub updated_at: Timestamp,

    /// Configured execution timeout in seconds.
    #[serde(rename = "timeout")]
    pub timeout_secs: u64,

    /// Free-form marker describing where the payload came from
    /// (e.g. `"sketch_conversion"`).
    pub origin: String,

    /// Failure message, set when `status` is `failed` (or `timeout`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Result snapshot produced by the payload on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl TaskRecord {
    /// Create a fresh `pending` record for a newly submitted task.
    pub fn new(id: TaskId, origin: impl Into<String>, timeout_secs: u64) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
            timeout_secs,
            origin: origin.into(),
            error: None,
            result: None,
        }
    }
}

// ---------------------------------------------------------------------------
// StatusEvent
// ---------------------------------------------------------------------------

/// A point-in-time status transition, published on `task_updates:<task_id>`.
///
/// Transient: delivered to whoever is subscribed at publish time, never
/// persisted. A late subscriber recovers final state by reading the
/// [`TaskRecord`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub timestamp: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl StatusEvent {
    /// Build the event describing a record's current state.
    pub fn from_record(record: &TaskRecord) -> Self {
        Self {
            task_id: record.id.clone(),
            status: record.status,
            timestamp: record.updated_at,
            error: record.error.clone(),
            result: record.result.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
