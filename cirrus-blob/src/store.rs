use async_trait::async_trait;
use bytes::Bytes;
use cirrus_core::RemoteResult;

use crate::ETag;

/// Guard applied to a blob write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutCondition {
    /// Write unconditionally.
    Overwrite,
    /// Fail with `AlreadyExists` if the blob is present.
    IfNotExists,
    /// Fail with `PreconditionFailed` unless the current token matches.
    IfMatch(ETag),
}

/// A blob as returned by the store.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub data: Bytes,
    pub etag: ETag,
}

/// One page of a blob listing.
#[derive(Debug, Clone, Default)]
pub struct BlobPage {
    pub names: Vec<String>,
    /// Present when more names follow.
    pub continuation: Option<String>,
}

/// Remote blob primitive - implemented by every storage backend.
///
/// Implementations report platform conditions through `RemoteError`:
/// `ContainerNotFound`, `BlobNotFound`, `AlreadyExists`,
/// `PreconditionFailed`, `BeingDeleted`, and transient kinds. They never
/// retry and never create containers implicitly; the adapter does both.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fails with `AlreadyExists` if the container is present.
    async fn create_container(&self, container: &str) -> RemoteResult<()>;

    /// Fails with `ContainerNotFound` if the container is missing.
    async fn delete_container(&self, container: &str) -> RemoteResult<()>;

    async fn list_containers(&self, prefix: &str) -> RemoteResult<Vec<String>>;

    /// Store a blob, returning the new token.
    async fn put(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        condition: PutCondition,
    ) -> RemoteResult<ETag>;

    async fn get(&self, container: &str, name: &str) -> RemoteResult<StoredBlob>;

    /// `Ok(None)` when the current token equals `etag`.
    async fn get_if_none_match(
        &self,
        container: &str,
        name: &str,
        etag: &ETag,
    ) -> RemoteResult<Option<StoredBlob>>;

    /// Token of the blob without its content.
    async fn head(&self, container: &str, name: &str) -> RemoteResult<ETag>;

    async fn delete(&self, container: &str, name: &str) -> RemoteResult<()>;

    /// Names under `prefix`, in lexicographic order, one page at a time.
    async fn list(
        &self,
        container: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> RemoteResult<BlobPage>;
}
