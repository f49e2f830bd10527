//! Task record store and notification channel.
//!
//! One external key/value service (Redis) plays two roles for the
//! orchestration core:
//!
//! - **Record store** -- serialized [`TaskRecord`](inksketch_core::TaskRecord)s
//!   under `task:<id>`, expiring 24 hours after the most recent write.
//! - **Notification channel** -- every status transition is published as a
//!   [`StatusEvent`](inksketch_core::StatusEvent) on `task_updates:<id>`;
//!   relays consume the wildcard pattern.
//!
//! [`TaskStore`] is the trait the scheduler and relays program against.
//! [`RedisStore`] is the production implementation; [`MemoryStore`] backs
//! tests and store-less local development.

pub mod error;
pub mod keys;
pub mod memory;
pub mod redis;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis::RedisStore;
pub use store::TaskStore;
