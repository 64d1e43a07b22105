//! Persistence contract for scheduled jobs.

use async_trait::async_trait;

use crate::{error::Result, types::Job};

/// Durable mirror of the scheduler's job registry.
///
/// Implementations must be behaviorally interchangeable beyond their
/// persistence medium.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace the job with this id.
    async fn save(&self, job: &Job) -> Result<()>;

    /// Remove the job if present; an absent id is a no-op, not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    /// All persisted jobs, unspecified order.
    async fn load_all(&self) -> Result<Vec<Job>>;
}
