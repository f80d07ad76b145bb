use cirrus_core::{RemoteError, SerializationError};
use thiserror::Error;

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob operations.
///
/// Not-found conditions and etag conflicts are not errors: reads return
/// `None`, conditional writes return `None`/`UpdateOutcome::Conflict`.
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid request: {message}")]
    Invalid { message: String },

    #[error("Blob too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Storage backend error: {source}")]
    Remote {
        #[from]
        source: RemoteError,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: SerializationError,
    },
}

impl BlobError {
    /// Create an invalid request error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// The underlying remote error, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote { source } => Some(source),
            _ => None,
        }
    }
}
