use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use cirrus_core::{FaultInjector, RemoteError, RemoteErrorKind, RemoteResult};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::store::{BlobPage, BlobStore, PutCondition, StoredBlob};
use crate::ETag;

type Containers = HashMap<String, BTreeMap<String, StoredBlob>>;

/// In-memory blob store for tests and development.
///
/// Reproduces the platform behaviour the adapter relies on: a fresh etag on
/// every write, conditional writes, `ContainerNotFound` for missing
/// containers, paged listings, and optionally a delay before a deleted
/// container name can be reused.
pub struct MemoryBlobStore {
    containers: RwLock<Containers>,
    /// container -> remaining create attempts that report `BeingDeleted`
    recently_deleted: RwLock<HashMap<String, u32>>,
    deletion_lag: u32,
    page_size: usize,
    faults: FaultInjector,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            recently_deleted: RwLock::new(HashMap::new()),
            deletion_lag: 0,
            page_size: 1000,
            faults: FaultInjector::new(),
        }
    }

    /// After a container is deleted, the next `attempts` creations of the
    /// same name fail with `BeingDeleted`.
    pub fn with_deletion_lag(mut self, attempts: u32) -> Self {
        self.deletion_lag = attempts;
        self
    }

    /// Maximum names per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Number of blobs currently stored in `container` (0 when missing).
    pub fn blob_count(&self, container: &str) -> usize {
        self.containers
            .read()
            .get(container)
            .map(|blobs| blobs.len())
            .unwrap_or(0)
    }

    fn new_etag() -> ETag {
        ETag(format!("\"0x{}\"", Uuid::new_v4().simple()))
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn create_container(&self, container: &str) -> RemoteResult<()> {
        self.faults.check("create_container")?;

        {
            let mut deleted = self.recently_deleted.write();
            if let Some(remaining) = deleted.get_mut(container) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RemoteError::new(
                        RemoteErrorKind::BeingDeleted,
                        format!("container '{}' is being deleted", container),
                    ));
                }
                deleted.remove(container);
            }
        }

        let mut containers = self.containers.write();
        if containers.contains_key(container) {
            return Err(RemoteError::already_exists(format!(
                "container '{}' already exists",
                container
            )));
        }
        containers.insert(container.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn delete_container(&self, container: &str) -> RemoteResult<()> {
        self.faults.check("delete_container")?;

        if self.containers.write().remove(container).is_none() {
            return Err(RemoteError::container_not_found(container));
        }
        if self.deletion_lag > 0 {
            self.recently_deleted
                .write()
                .insert(container.to_string(), self.deletion_lag);
        }
        Ok(())
    }

    async fn list_containers(&self, prefix: &str) -> RemoteResult<Vec<String>> {
        self.faults.check("list_containers")?;

        let mut names: Vec<String> = self
            .containers
            .read()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn put(
        &self,
        container: &str,
        name: &str,
        data: Bytes,
        condition: PutCondition,
    ) -> RemoteResult<ETag> {
        self.faults.check("put")?;

        let mut containers = self.containers.write();
        let blobs = containers
            .get_mut(container)
            .ok_or_else(|| RemoteError::container_not_found(container))?;

        match (&condition, blobs.get(name)) {
            (PutCondition::IfNotExists, Some(_)) => {
                return Err(RemoteError::already_exists(format!(
                    "blob '{}/{}' already exists",
                    container, name
                )));
            }
            (PutCondition::IfMatch(expected), Some(current)) if current.etag != *expected => {
                return Err(RemoteError::precondition_failed(format!(
                    "etag mismatch on '{}/{}'",
                    container, name
                )));
            }
            (PutCondition::IfMatch(_), None) => {
                return Err(RemoteError::precondition_failed(format!(
                    "blob '{}/{}' no longer exists",
                    container, name
                )));
            }
            _ => {}
        }

        let etag = Self::new_etag();
        blobs.insert(
            name.to_string(),
            StoredBlob {
                data,
                etag: etag.clone(),
            },
        );
        Ok(etag)
    }

    async fn get(&self, container: &str, name: &str) -> RemoteResult<StoredBlob> {
        self.faults.check("get")?;

        let containers = self.containers.read();
        let blobs = containers
            .get(container)
            .ok_or_else(|| RemoteError::container_not_found(container))?;
        blobs
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::blob_not_found(container, name))
    }

    async fn get_if_none_match(
        &self,
        container: &str,
        name: &str,
        etag: &ETag,
    ) -> RemoteResult<Option<StoredBlob>> {
        let blob = self.get(container, name).await?;
        if blob.etag == *etag {
            Ok(None)
        } else {
            Ok(Some(blob))
        }
    }

    async fn head(&self, container: &str, name: &str) -> RemoteResult<ETag> {
        Ok(self.get(container, name).await?.etag)
    }

    async fn delete(&self, container: &str, name: &str) -> RemoteResult<()> {
        self.faults.check("delete")?;

        let mut containers = self.containers.write();
        let blobs = containers
            .get_mut(container)
            .ok_or_else(|| RemoteError::container_not_found(container))?;
        blobs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RemoteError::blob_not_found(container, name))
    }

    async fn list(
        &self,
        container: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> RemoteResult<BlobPage> {
        self.faults.check("list")?;

        let containers = self.containers.read();
        let blobs = containers
            .get(container)
            .ok_or_else(|| RemoteError::container_not_found(container))?;

        let mut names: Vec<String> = blobs
            .keys()
            .filter(|name| name.starts_with(prefix))
            .filter(|name| continuation.as_ref().map_or(true, |after| *name > after))
            .take(self.page_size + 1)
            .cloned()
            .collect();

        let continuation = if names.len() > self.page_size {
            names.truncate(self.page_size);
            names.last().cloned()
        } else {
            None
        };
        Ok(BlobPage {
            names,
            continuation,
        })
    }
}
