//! Shared domain types for the inksketch task orchestration subsystem.
//!
//! This crate has zero internal dependencies. It defines the task lifecycle
//! state machine, the persisted and published record shapes, and the error
//! type shared by the other crates.

pub mod error;
pub mod task;
pub mod task_events;
pub mod types;

pub use error::CoreError;
pub use task::{StatusEvent, TaskRecord, TaskStatus};
