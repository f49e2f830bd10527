//! Task scheduler: submission, bounded execution, cancellation, listing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use inksketch_core::types::TaskId;
use inksketch_core::{StatusEvent, TaskRecord, TaskStatus};
use inksketch_store::{StoreError, TaskStore};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What a payload produces: an optional JSON result snapshot, or an opaque
/// error whose message is captured on the record.
pub type TaskOutput = anyhow::Result<Option<serde_json::Value>>;

/// How long a cancelled or timed-out payload gets to observe its
/// cancellation token before it is aborted outright.
const SETTLE_GRACE: Duration = Duration::from_millis(500);

/// Bookkeeping for a task tracked as in-flight in this process.
struct InflightTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// In-process task scheduler with a global concurrency gate.
///
/// Construct once at startup and share via `Arc`; there is no ambient
/// global instance. [`shutdown`](TaskScheduler::shutdown) is part of the
/// owning process's teardown sequence.
pub struct TaskScheduler {
    store: Arc<dyn TaskStore>,
    semaphore: Arc<Semaphore>,
    inflight: Arc<Mutex<HashMap<TaskId, InflightTask>>>,
    default_timeout: Duration,
}

impl TaskScheduler {
    /// Create a scheduler allowing at most `max_concurrent` payloads in the
    /// `running` state at once. `default_timeout` applies to submissions
    /// that do not carry their own.
    pub fn new(store: Arc<dyn TaskStore>, max_concurrent: usize, default_timeout: Duration) -> Self {
        Self {
            store,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            default_timeout,
        }
    }

    /// Submit a payload for execution.
    ///
    /// `timeout` falls back to the scheduler-wide default when `None`.
    /// Writes a `pending` record, then schedules the payload without
    /// blocking the caller; the scheduled body waits for a concurrency slot
    /// before transitioning to `running`. Fails only if the initial record
    /// write fails -- in that case nothing is scheduled.
    ///
    /// The payload receives a child [`CancellationToken`] that is triggered
    /// on timeout and on [`cancel`](TaskScheduler::cancel). A payload that
    /// ignores it is dropped forcibly after a short grace period, so the
    /// timeout bound is only advisory for payloads that also block outside
    /// the async runtime.
    pub async fn submit<F, Fut>(
        &self,
        origin: &str,
        timeout: Option<Duration>,
        task_id: Option<TaskId>,
        work: F,
    ) -> Result<TaskId, StoreError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = TaskOutput> + Send + 'static,
    {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let task_id = task_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let record = TaskRecord::new(task_id.clone(), origin, timeout.as_secs());

        // The initial write is the only synchronous failure point.
        self.store.put(&record).await?;

        let cancel = CancellationToken::new();
        let body = run_task(
            Arc::clone(&self.store),
            Arc::clone(&self.semaphore),
            Arc::clone(&self.inflight),
            record,
            timeout,
            cancel.clone(),
            work,
        );

        // Hold the in-flight lock across the spawn so the body cannot
        // settle (and try to deregister itself) before it is registered.
        let mut inflight = self.inflight.lock().await;
        let handle = tokio::spawn(body);
        inflight.insert(task_id.clone(), InflightTask { handle, cancel });

        tracing::info!(task_id = %task_id, origin, "Task submitted");
        Ok(task_id)
    }

    /// Point read of a task's record.
    pub async fn status(&self, task_id: &str) -> Result<Option<TaskRecord>, StoreError> {
        self.store.get(task_id).await
    }

    /// Request cancellation of a task tracked as in-flight in this process
    /// and await its settlement.
    ///
    /// Returns `false` if the task is not tracked locally -- it may already
    /// be terminal, or belong to another process. Best-effort and
    /// local-process-only by design.
    pub async fn cancel(&self, task_id: &str) -> bool {
        let entry = self.inflight.lock().await.remove(task_id);
        let Some(task) = entry else {
            return false;
        };

        task.cancel.cancel();
        if let Err(e) = task.handle.await {
            tracing::error!(task_id, error = %e, "Cancelled task body did not settle cleanly");
        }
        tracing::info!(task_id, "Task cancelled");
        true
    }

    /// All task records in the store, newest first, optionally filtered by
    /// status. Full-scan; bounded by the concurrency limit and the 24 h
    /// retention window.
    pub async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<TaskRecord>, StoreError> {
        let mut records = self.store.scan().await?;
        if let Some(wanted) = status {
            records.retain(|r| r.status == wanted);
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Number of tasks currently tracked as in-flight (pending or running).
    pub async fn inflight_count(&self) -> usize {
        self.inflight.lock().await.len()
    }

    /// Cancel every in-flight task and await settlement.
    ///
    /// Called during process teardown so each interrupted task leaves a
    /// `cancelled` record instead of a permanently stale one.
    pub async fn shutdown(&self) {
        let drained: Vec<(TaskId, InflightTask)> =
            self.inflight.lock().await.drain().collect();
        if drained.is_empty() {
            return;
        }

        tracing::info!(count = drained.len(), "Cancelling in-flight tasks for shutdown");
        for (_, task) in &drained {
            task.cancel.cancel();
        }
        for (task_id, task) in drained {
            if let Err(e) = task.handle.await {
                tracing::error!(%task_id, error = %e, "Task body did not settle during shutdown");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Execution body
// ---------------------------------------------------------------------------

/// Terminal outcome of one execution.
enum Settlement {
    Completed(Option<serde_json::Value>),
    Failed(String),
    TimedOut,
    Cancelled,
}

/// The scheduled body of a single task.
///
/// Exit discipline: on every path the semaphore permit is released (by
/// drop), exactly one terminal transition is applied, and the in-flight
/// entry is removed.
#[allow(clippy::too_many_arguments)]
async fn run_task<F, Fut>(
    store: Arc<dyn TaskStore>,
    semaphore: Arc<Semaphore>,
    inflight: Arc<Mutex<HashMap<TaskId, InflightTask>>>,
    mut record: TaskRecord,
    timeout: Duration,
    cancel: CancellationToken,
    work: F,
) where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = TaskOutput> + Send + 'static,
{
    let task_id = record.id.clone();

    // Wait for a slot; a cancel that lands first settles `pending ->
    // cancelled` without the task ever running.
    let permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
    };

    let settlement = match permit {
        None => Settlement::Cancelled,
        Some(_permit) => {
            transition(store.as_ref(), &mut record, TaskStatus::Running, None, None).await;
            execute(&task_id, timeout, &cancel, work).await
            // _permit drops here: the slot is released before the terminal
            // write regardless of outcome.
        }
    };

    let (status, error, result) = match settlement {
        Settlement::Completed(result) => {
            tracing::info!(task_id = %task_id, "Task completed");
            (TaskStatus::Completed, None, result)
        }
        Settlement::Failed(message) => {
            tracing::error!(task_id = %task_id, error = %message, "Task failed");
            (TaskStatus::Failed, Some(message), None)
        }
        Settlement::TimedOut => {
            tracing::error!(
                task_id = %task_id,
                timeout_secs = timeout.as_secs(),
                "Task timed out"
            );
            (TaskStatus::Timeout, None, None)
        }
        Settlement::Cancelled => (TaskStatus::Cancelled, None, None),
    };
    transition(store.as_ref(), &mut record, status, error, result).await;

    inflight.lock().await.remove(&task_id);
}

/// Run the payload under the timeout, isolated in its own task so a panic
/// is captured as a failure rather than tearing down the body.
async fn execute<F, Fut>(
    task_id: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    work: F,
) -> Settlement
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = TaskOutput> + Send + 'static,
{
    let work_token = cancel.child_token();
    let mut work_handle = tokio::spawn(work(work_token.clone()));

    // `biased` so a cancel that races the payload's own settlement always
    // wins: a cancelled task must never be reported as completed.
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            settle_interrupted(task_id, work_token, work_handle).await;
            Settlement::Cancelled
        }
        joined = tokio::time::timeout(timeout, &mut work_handle) => match joined {
            Err(_elapsed) => {
                settle_interrupted(task_id, work_token, work_handle).await;
                Settlement::TimedOut
            }
            Ok(Ok(Ok(result))) => Settlement::Completed(result),
            Ok(Ok(Err(e))) => Settlement::Failed(e.to_string()),
            Ok(Err(join_err)) => Settlement::Failed(join_err.to_string()),
        },
    }
}

/// Give an interrupted payload a grace period to observe its cancellation
/// token, then abort whatever is left.
async fn settle_interrupted(
    task_id: &str,
    work_token: CancellationToken,
    mut work_handle: JoinHandle<TaskOutput>,
) {
    work_token.cancel();
    if tokio::time::timeout(SETTLE_GRACE, &mut work_handle)
        .await
        .is_err()
    {
        tracing::warn!(task_id, "Payload ignored cancellation, aborting");
        work_handle.abort();
        let _ = work_handle.await;
    }
}

/// Apply one status transition: mutate the scheduler-owned record copy,
/// write it to the store, then publish the event.
///
/// The write happens-before the publish; if the write fails the publish is
/// skipped (a subscriber must never observe an event the store does not yet
/// reflect) and the failure is logged -- execution is not aborted, so a task
/// can settle with a stale stored status. Transitions the lifecycle graph
/// forbids are dropped, which keeps terminal statuses absorbing even if a
/// late timeout fires after a cancel.
async fn transition(
    store: &dyn TaskStore,
    record: &mut TaskRecord,
    next: TaskStatus,
    error: Option<String>,
    result: Option<serde_json::Value>,
) {
    if !record.status.can_transition_to(next) {
        tracing::warn!(
            task_id = %record.id,
            from = %record.status,
            to = %next,
            "Dropping invalid status transition"
        );
        return;
    }

    record.status = next;
    record.updated_at = chrono::Utc::now();
    if error.is_some() {
        record.error = error;
    }
    if result.is_some() {
        record.result = result;
    }

    if let Err(e) = store.put(record).await {
        tracing::error!(
            task_id = %record.id,
            status = %next,
            error = %e,
            "Task status write failed, skipping publish"
        );
        return;
    }

    if let Err(e) = store.publish(&StatusEvent::from_record(record)).await {
        tracing::error!(
            task_id = %record.id,
            status = %next,
            error = %e,
            "Task status publish failed"
        );
    }
}
