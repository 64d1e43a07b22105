//! The persisted job record.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// How the schedule string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    /// Cron expression or named shorthand (`@daily`, `@hourly`, `@every 5m`).
    Cron,
    /// Bare interval duration (`"30s"`, `"2h"`).
    Every,
    /// One-shot instant; the job removes itself after firing.
    At,
}

/// A persisted scheduled job.
///
/// The run-state fields (`last_run_at`, `last_error`, `run_count`) are
/// mutated only by the execution path, which serializes per job, so they
/// never race even though distinct jobs execute concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Caller-supplied unique id; never empty.
    pub id: String,
    /// Schedule expression, interpreted per `type`.
    pub schedule: String,
    #[serde(rename = "type")]
    pub kind: JobType,
    /// Opaque payload forwarded to the handler.
    pub command: String,
    /// Channel the handler delivers results through.
    pub channel: String,
    pub chat_id: String,
    pub enabled: bool,
    #[serde(default)]
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub run_count: u32,
}
