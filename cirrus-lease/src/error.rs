use cirrus_blob::BlobError;
use thiserror::Error;

/// Result type for lease operations
pub type LeaseResult<T> = Result<T, LeaseError>;

/// Errors that can occur while coordinating scheduled jobs.
///
/// Losing an acquisition race is not an error; see `Acquisition::Conflict`.
#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("Scheduling state storage error: {0}")]
    Blob(#[from] BlobError),

    #[error("Invalid job name: {0:?}")]
    InvalidJob(String),
}
