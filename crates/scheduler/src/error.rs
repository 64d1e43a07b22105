use thiserror::Error;

/// Crate-wide result type for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    /// The schedule expression cannot be translated into a trigger.
    #[error("invalid schedule: {message}")]
    InvalidSchedule { message: String },

    /// The job record itself is malformed (e.g. empty id).
    #[error("invalid job: {message}")]
    InvalidJob { message: String },

    /// A job with this id is already registered.
    #[error("job already exists: {job_id}")]
    DuplicateJob { job_id: String },

    /// No job with this id is registered.
    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },
}

impl Error {
    #[must_use]
    pub fn invalid_schedule(message: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_job(message: impl Into<String>) -> Self {
        Self::InvalidJob {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn duplicate_job(job_id: impl Into<String>) -> Self {
        Self::DuplicateJob {
            job_id: job_id.into(),
        }
    }

    #[must_use]
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound {
            job_id: job_id.into(),
        }
    }
}
