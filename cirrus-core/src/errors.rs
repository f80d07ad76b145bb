//! # Remote errors
//!
//! Every backend (blob, queue, table) reports failures as a [`RemoteError`].
//! The [`RemoteErrorKind`] carries the classification providers act on:
//!
//! - not-found kinds are turned into empty/absent results on read paths;
//! - transient kinds (`ServerBusy`, `Timeout`, `Internal`) are retried with
//!   bounded exponential backoff;
//! - `BeingDeleted` is retried with the patient slow-instantiation policy;
//! - `PreconditionFailed` / `AlreadyExists` surface as conflicts.
//!
//! Kinds map to the HTTP status codes the storage platform uses, which keeps
//! log lines comparable with the platform's own diagnostics.

use thiserror::Error;

/// A convenience result type for backend calls.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Classification of a remote storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    ContainerNotFound,  // 404
    BlobNotFound,       // 404
    QueueNotFound,      // 404
    MessageNotFound,    // 404
    TableNotFound,      // 404
    EntityNotFound,     // 404
    AlreadyExists,      // 409
    BeingDeleted,       // 409
    PreconditionFailed, // 412
    RequestTooLarge,    // 413
    InvalidInput,       // 400
    Internal,           // 500
    ServerBusy,         // 503
    Timeout,            // 504
    Other,              // 500
}

impl RemoteErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            RemoteErrorKind::ContainerNotFound
            | RemoteErrorKind::BlobNotFound
            | RemoteErrorKind::QueueNotFound
            | RemoteErrorKind::MessageNotFound
            | RemoteErrorKind::TableNotFound
            | RemoteErrorKind::EntityNotFound => 404,
            RemoteErrorKind::AlreadyExists | RemoteErrorKind::BeingDeleted => 409,
            RemoteErrorKind::PreconditionFailed => 412,
            RemoteErrorKind::RequestTooLarge => 413,
            RemoteErrorKind::InvalidInput => 400,
            RemoteErrorKind::Internal | RemoteErrorKind::Other => 500,
            RemoteErrorKind::ServerBusy => 503,
            RemoteErrorKind::Timeout => 504,
        }
    }

    /// Platform error code name (e.g. "ContainerNotFound")
    pub fn name(&self) -> &'static str {
        match self {
            RemoteErrorKind::ContainerNotFound => "ContainerNotFound",
            RemoteErrorKind::BlobNotFound => "BlobNotFound",
            RemoteErrorKind::QueueNotFound => "QueueNotFound",
            RemoteErrorKind::MessageNotFound => "MessageNotFound",
            RemoteErrorKind::TableNotFound => "TableNotFound",
            RemoteErrorKind::EntityNotFound => "ResourceNotFound",
            RemoteErrorKind::AlreadyExists => "AlreadyExists",
            RemoteErrorKind::BeingDeleted => "BeingDeleted",
            RemoteErrorKind::PreconditionFailed => "ConditionNotMet",
            RemoteErrorKind::RequestTooLarge => "RequestBodyTooLarge",
            RemoteErrorKind::InvalidInput => "InvalidInput",
            RemoteErrorKind::Internal => "InternalError",
            RemoteErrorKind::ServerBusy => "ServerBusy",
            RemoteErrorKind::Timeout => "OperationTimedOut",
            RemoteErrorKind::Other => "Unknown",
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == 404
    }

    /// Faults worth retrying with the transient policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteErrorKind::Internal | RemoteErrorKind::ServerBusy | RemoteErrorKind::Timeout
        )
    }
}

impl std::fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.status_code())
    }
}

/// Error returned by every remote storage primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new<S: Into<String>>(kind: RemoteErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn container_not_found<S: AsRef<str>>(container: S) -> Self {
        Self::new(
            RemoteErrorKind::ContainerNotFound,
            format!("container '{}' does not exist", container.as_ref()),
        )
    }

    pub fn blob_not_found<S: AsRef<str>>(container: S, name: S) -> Self {
        Self::new(
            RemoteErrorKind::BlobNotFound,
            format!("blob '{}/{}' does not exist", container.as_ref(), name.as_ref()),
        )
    }

    pub fn queue_not_found<S: AsRef<str>>(queue: S) -> Self {
        Self::new(
            RemoteErrorKind::QueueNotFound,
            format!("queue '{}' does not exist", queue.as_ref()),
        )
    }

    pub fn table_not_found<S: AsRef<str>>(table: S) -> Self {
        Self::new(
            RemoteErrorKind::TableNotFound,
            format!("table '{}' does not exist", table.as_ref()),
        )
    }

    pub fn precondition_failed<S: Into<String>>(message: S) -> Self {
        Self::new(RemoteErrorKind::PreconditionFailed, message)
    }

    pub fn already_exists<S: Into<String>>(message: S) -> Self {
        Self::new(RemoteErrorKind::AlreadyExists, message)
    }

    pub fn kind(&self) -> RemoteErrorKind {
        self.kind
    }

    pub fn is_not_found(&self) -> bool {
        self.kind.is_not_found()
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Resource was deleted moments ago and cannot be re-created yet.
    pub fn is_being_deleted(&self) -> bool {
        self.kind == RemoteErrorKind::BeingDeleted
    }

    /// Compare-and-swap style rejection (token mismatch or "must not exist" violated).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::PreconditionFailed | RemoteErrorKind::AlreadyExists
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_kinds_share_status() {
        for kind in [
            RemoteErrorKind::ContainerNotFound,
            RemoteErrorKind::BlobNotFound,
            RemoteErrorKind::QueueNotFound,
            RemoteErrorKind::MessageNotFound,
            RemoteErrorKind::TableNotFound,
            RemoteErrorKind::EntityNotFound,
        ] {
            assert!(kind.is_not_found(), "{kind} should be not-found");
            assert!(!kind.is_transient());
        }
    }

    #[test]
    fn classification_helpers() {
        let busy = RemoteError::new(RemoteErrorKind::ServerBusy, "throttled");
        assert!(busy.is_transient());
        assert!(!busy.is_conflict());

        let cas = RemoteError::precondition_failed("etag mismatch");
        assert!(cas.is_conflict());
        assert!(!cas.is_transient());

        let gone = RemoteError::new(RemoteErrorKind::BeingDeleted, "queue being deleted");
        assert!(gone.is_being_deleted());
        assert!(!gone.is_transient());
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = RemoteError::container_not_found("photos");
        assert_eq!(
            err.to_string(),
            "ContainerNotFound (404): container 'photos' does not exist"
        );
    }
}
