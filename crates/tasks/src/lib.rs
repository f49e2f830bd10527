//! Bounded-concurrency task scheduler.
//!
//! [`TaskScheduler`] accepts opaque asynchronous payloads, runs them under a
//! process-wide concurrency gate with a per-task timeout, records every
//! lifecycle transition in the task store, and publishes each transition on
//! the notification channel. Execution is at-most-once and local to this
//! process; status durability is best-effort relative to execution.

mod scheduler;

pub use scheduler::{TaskOutput, TaskScheduler};
