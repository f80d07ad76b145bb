use cirrus_core::{RemoteError, SerializationError};
use thiserror::Error;

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;

/// Errors that can occur during table operations.
///
/// A failed batch surfaces as one error; batches sent before it stay applied.
#[derive(Error, Debug)]
pub enum TableError {
    #[error("Storage backend error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Entity too large: {size} bytes (max: {max})")]
    EntityTooLarge { size: usize, max: usize },

    #[error("Batch rejected in partition '{partition_key}': {source}")]
    Conflict {
        partition_key: String,
        source: RemoteError,
    },

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Corrupt entity: {0}")]
    CorruptEntity(String),
}

impl TableError {
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid(message.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
