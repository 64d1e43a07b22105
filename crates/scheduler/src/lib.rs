//! Persistent job scheduling with per-job concurrency safety.
//!
//! Jobs carry a schedule expression (`cron`), a bare interval (`every`), or a
//! one-shot instant (`at`) plus an opaque command payload. The [`Scheduler`]
//! keeps the registry in memory, mirrors it through a pluggable [`JobStore`],
//! and invokes a handler callback when a job fires. Execution is isolated:
//! an overlapping firing of the same job is skipped rather than queued, and a
//! panicking handler is recorded on the job instead of taking down the
//! scheduler or any sibling job.

pub mod error;
pub mod parse;
pub mod schedule;
pub mod service;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    error::{Error, Result},
    schedule::Trigger,
    service::{JobHandler, Scheduler, SchedulerConfig},
    store::JobStore,
    store_file::FileStore,
    store_memory::MemoryStore,
    store_sqlite::SqliteStore,
    types::{Job, JobType},
};
