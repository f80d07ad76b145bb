use std::sync::Arc;

use bytes::Bytes;
use cirrus_core::{BoxStream, DataSerializer, JsonSerializer, RemoteErrorKind, RemoteResult};
use futures_util::TryStreamExt;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::store::PutCondition;
use crate::{BlobConfig, BlobError, BlobResult, BlobStore, ETag, Modified, UpdateOutcome, Versioned};

/// The versioned blob adapter - what the queue and lease layers embed.
///
/// Wraps a [`BlobStore`] with retries, container auto-creation on write,
/// capacity checks and typed access through the injected serializer.
/// Missing containers and blobs read as `None`; etag conflicts are reported
/// as `None`/[`UpdateOutcome::Conflict`], never as errors.
pub struct BlobAdapter<S: DataSerializer = JsonSerializer> {
    store: Arc<dyn BlobStore>,
    serializer: S,
    config: BlobConfig,
}

impl<S: DataSerializer> Clone for BlobAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            serializer: self.serializer.clone(),
            config: self.config.clone(),
        }
    }
}

impl BlobAdapter<JsonSerializer> {
    /// Create a new blob adapter with JSON serialization and default config
    pub fn new<B: BlobStore + 'static>(store: B) -> Self {
        Self::from_arc(Arc::new(store))
    }

    /// Create from a store shared with other components
    pub fn from_arc(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
            serializer: JsonSerializer,
            config: BlobConfig::default(),
        }
    }
}

impl<S: DataSerializer> BlobAdapter<S> {
    /// Swap the serializer used by the typed operations
    pub fn with_serializer<S2: DataSerializer>(self, serializer: S2) -> BlobAdapter<S2> {
        BlobAdapter {
            store: self.store,
            serializer,
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: BlobConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    // ----- containers -----

    /// Create a container. Returns `false` if it already existed.
    ///
    /// A container deleted moments ago cannot be re-created right away; this
    /// waits it out with the slow-instantiation policy.
    #[instrument(skip(self))]
    pub async fn create_container(&self, container: &str) -> BlobResult<bool> {
        let result = self
            .config
            .retry
            .slow_instantiation("blob.create_container", || {
                self.store.create_container(container)
            })
            .await;
        match result {
            Ok(()) => {
                info!("Created container {}", container);
                Ok(true)
            }
            Err(err) if err.is_conflict() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete a container. Returns `false` if there was nothing to delete.
    #[instrument(skip(self))]
    pub async fn delete_container(&self, container: &str) -> BlobResult<bool> {
        let result = self
            .config
            .retry
            .transient("blob.delete_container", || self.store.delete_container(container))
            .await;
        match result {
            Ok(()) => {
                info!("Deleted container {}", container);
                Ok(true)
            }
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_containers(&self, prefix: &str) -> BlobResult<Vec<String>> {
        Ok(self
            .config
            .retry
            .transient("blob.list_containers", || self.store.list_containers(prefix))
            .await?)
    }

    // ----- raw bytes -----

    /// Store `data`. With `overwrite == false` an existing blob is left
    /// untouched and `None` is returned.
    pub async fn put_bytes(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        overwrite: bool,
    ) -> BlobResult<Option<ETag>> {
        let condition = if overwrite {
            PutCondition::Overwrite
        } else {
            PutCondition::IfNotExists
        };
        self.conditional_write(container, name, data, condition).await
    }

    /// Write `data` only if the blob is still at `expected`, or does not exist
    /// when `expected` is `None`. Returns the new token, or `None` on conflict.
    pub async fn compare_and_swap_bytes(
        &self,
        container: &str,
        name: &str,
        expected: Option<&ETag>,
        data: Bytes,
    ) -> BlobResult<Option<ETag>> {
        let condition = match expected {
            Some(etag) => PutCondition::IfMatch(etag.clone()),
            None => PutCondition::IfNotExists,
        };
        self.conditional_write(container, name, data, condition).await
    }

    pub async fn get_bytes(&self, container: &str, name: &str) -> BlobResult<Option<Versioned<Bytes>>> {
        let result = self
            .config
            .retry
            .transient("blob.get", || self.store.get(container, name))
            .await;
        match result {
            Ok(blob) => Ok(Some(Versioned::new(blob.data, blob.etag))),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch the blob only if its token differs from `etag`.
    pub async fn get_bytes_if_modified(
        &self,
        container: &str,
        name: &str,
        etag: &ETag,
    ) -> BlobResult<Modified<Bytes>> {
        let result = self
            .config
            .retry
            .transient("blob.get_if_modified", || {
                self.store.get_if_none_match(container, name, etag)
            })
            .await;
        match result {
            Ok(Some(blob)) => Ok(Modified::Modified(Versioned::new(blob.data, blob.etag))),
            Ok(None) => Ok(Modified::Unchanged),
            Err(err) if err.is_not_found() => Ok(Modified::Absent),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_etag(&self, container: &str, name: &str) -> BlobResult<Option<ETag>> {
        let result = self
            .config
            .retry
            .transient("blob.head", || self.store.head(container, name))
            .await;
        match result {
            Ok(etag) => Ok(Some(etag)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns `false` if the blob (or its container) did not exist.
    pub async fn delete_blob(&self, container: &str, name: &str) -> BlobResult<bool> {
        let result = self
            .config
            .retry
            .transient("blob.delete", || self.store.delete(container, name))
            .await;
        match result {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Lazily list blob names under `prefix`, fetching one page at a time.
    /// A missing container yields an empty stream.
    pub fn list_blob_names(&self, container: &str, prefix: &str) -> BoxStream<'static, BlobResult<String>> {
        let store = Arc::clone(&self.store);
        let retry = self.config.retry.clone();
        let container = container.to_string();
        let prefix = prefix.to_string();

        let stream = async_stream::stream! {
            let mut continuation: Option<String> = None;
            loop {
                let token = continuation.take();
                let page = retry
                    .transient("blob.list", || store.list(&container, &prefix, token.clone()))
                    .await;
                let page = match page {
                    Ok(page) => page,
                    Err(err) if err.is_not_found() => return,
                    Err(err) => {
                        yield Err(BlobError::from(err));
                        return;
                    }
                };
                for name in page.names {
                    yield Ok(name);
                }
                match page.continuation {
                    Some(next) => continuation = Some(next),
                    None => return,
                }
            }
        };
        Box::pin(stream)
    }

    pub async fn list_blob_names_all(&self, container: &str, prefix: &str) -> BlobResult<Vec<String>> {
        self.list_blob_names(container, prefix).try_collect().await
    }

    /// Single-shot optimistic read-modify-write on raw bytes.
    ///
    /// `update` sees the current content (or `None`) and returns the new
    /// content, or `None` to abort without writing. If another writer got in
    /// between the read and the write the outcome is `Conflict`; retrying is
    /// up to the caller.
    #[instrument(skip(self, update))]
    pub async fn atomic_update_bytes<F>(
        &self,
        container: &str,
        name: &str,
        update: F,
    ) -> BlobResult<UpdateOutcome<Bytes>>
    where
        F: FnOnce(Option<Bytes>) -> Option<Bytes> + Send,
    {
        let current = self.get_bytes(container, name).await?;
        let (data, etag) = match current {
            Some(versioned) => (Some(versioned.value), Some(versioned.etag)),
            None => (None, None),
        };

        let next = match update(data) {
            Some(next) => next,
            None => return Ok(UpdateOutcome::Aborted),
        };

        match self
            .compare_and_swap_bytes(container, name, etag.as_ref(), next.clone())
            .await?
        {
            Some(etag) => Ok(UpdateOutcome::Applied { value: next, etag }),
            None => {
                debug!("Atomic update of {}/{} lost the race", container, name);
                Ok(UpdateOutcome::Conflict)
            }
        }
    }

    // ----- typed -----

    pub async fn put<T>(&self, container: &str, name: &str, value: &T, overwrite: bool) -> BlobResult<Option<ETag>>
    where
        T: Serialize + ?Sized + Sync,
    {
        let data = self.serializer.serialize(value)?;
        self.put_bytes(container, name, Bytes::from(data), overwrite).await
    }

    pub async fn get<T: DeserializeOwned>(&self, container: &str, name: &str) -> BlobResult<Option<Versioned<T>>> {
        match self.get_bytes(container, name).await? {
            Some(versioned) => {
                let value = self.serializer.deserialize(&versioned.value)?;
                Ok(Some(Versioned::new(value, versioned.etag)))
            }
            None => Ok(None),
        }
    }

    pub async fn get_if_modified<T: DeserializeOwned>(
        &self,
        container: &str,
        name: &str,
        etag: &ETag,
    ) -> BlobResult<Modified<T>> {
        match self.get_bytes_if_modified(container, name, etag).await? {
            Modified::Modified(versioned) => {
                let value = self.serializer.deserialize(&versioned.value)?;
                Ok(Modified::Modified(Versioned::new(value, versioned.etag)))
            }
            Modified::Unchanged => Ok(Modified::Unchanged),
            Modified::Absent => Ok(Modified::Absent),
        }
    }

    pub async fn compare_and_swap<T>(
        &self,
        container: &str,
        name: &str,
        expected: Option<&ETag>,
        value: &T,
    ) -> BlobResult<Option<ETag>>
    where
        T: Serialize + ?Sized + Sync,
    {
        let data = self.serializer.serialize(value)?;
        self.compare_and_swap_bytes(container, name, expected, Bytes::from(data))
            .await
    }

    /// Typed [`atomic_update_bytes`](Self::atomic_update_bytes).
    #[instrument(skip(self, update))]
    pub async fn atomic_update<T, F>(&self, container: &str, name: &str, update: F) -> BlobResult<UpdateOutcome<T>>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce(Option<T>) -> Option<T> + Send,
    {
        let current = self.get::<T>(container, name).await?;
        let (value, etag) = match current {
            Some(versioned) => (Some(versioned.value), Some(versioned.etag)),
            None => (None, None),
        };

        let next = match update(value) {
            Some(next) => next,
            None => return Ok(UpdateOutcome::Aborted),
        };
        let data = Bytes::from(self.serializer.serialize(&next)?);

        match self
            .compare_and_swap_bytes(container, name, etag.as_ref(), data)
            .await?
        {
            Some(etag) => Ok(UpdateOutcome::Applied { value: next, etag }),
            None => {
                debug!("Atomic update of {}/{} lost the race", container, name);
                Ok(UpdateOutcome::Conflict)
            }
        }
    }

    // ----- internals -----

    /// Conditional write with container auto-creation. Conflicts map to `None`.
    async fn conditional_write(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        condition: PutCondition,
    ) -> BlobResult<Option<ETag>> {
        if data.len() > self.config.max_blob_bytes {
            return Err(BlobError::TooLarge {
                size: data.len(),
                max: self.config.max_blob_bytes,
            });
        }

        let mut result = self.write_once(container, name, &data, &condition).await;
        if matches!(&result, Err(err) if err.kind == RemoteErrorKind::ContainerNotFound) {
            warn!("Container {} missing on write, creating it", container);
            self.create_container(container).await?;
            result = self.write_once(container, name, &data, &condition).await;
        }

        match result {
            Ok(etag) => Ok(Some(etag)),
            Err(err) if err.is_conflict() => Ok(None),
            // IfMatch against a blob that vanished
            Err(err) if err.is_not_found() && matches!(condition, PutCondition::IfMatch(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_once(
        &self,
        container: &str,
        name: &str,
        data: &Bytes,
        condition: &PutCondition,
    ) -> RemoteResult<ETag> {
        self.config
            .retry
            .transient("blob.put", || {
                self.store
                    .put(container, name, data.clone(), condition.clone())
            })
            .await
    }
}
