use cirrus_blob::BlobError;
use cirrus_core::{RemoteError, SerializationError};
use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations.
///
/// Missing queues and stale delivery handles are not errors: reads return
/// empty results and dispositions report `false`. Poison messages are
/// quarantined, never surfaced here.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Storage backend error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Overflow storage error: {0}")]
    Blob(#[from] BlobError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Record encoding error: {0}")]
    Record(#[from] serde_json::Error),

    #[error("Corrupt queue message: {0}")]
    CorruptMessage(String),

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

impl QueueError {
    pub fn corrupt<S: Into<String>>(message: S) -> Self {
        Self::CorruptMessage(message.into())
    }
}
