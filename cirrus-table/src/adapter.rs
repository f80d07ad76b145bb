use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use cirrus_core::{BoxStream, DataSerializer, JsonSerializer, RemoteError, RemoteErrorKind};
use futures_util::TryStreamExt;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::backend::{BatchOperation, Continuation, RowData, TableBackend, TableRow};
use crate::{codec, CloudEntity, RowFilter, TableConfig, TableError, TableResult};

/// Wide-entity table adapter.
///
/// Values go through the injected serializer and are sharded across the
/// `P0`..`P14` columns of one native row, so an entity can hold up to
/// `15 * 64KB - 1` serialized bytes. Writes are grouped by partition key and
/// sliced into batches that respect both the entity count and the payload
/// ceiling of [`TableConfig`].
///
/// A failed batch is reported as a single error. Batches sent before it stay
/// applied, so callers re-read when they need to know the exact state.
pub struct TableAdapter<S: DataSerializer = JsonSerializer> {
    backend: Arc<dyn TableBackend>,
    serializer: S,
    config: TableConfig,
}

impl<S: DataSerializer> Clone for TableAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            serializer: self.serializer.clone(),
            config: self.config.clone(),
        }
    }
}

impl TableAdapter<JsonSerializer> {
    pub fn new<B: TableBackend + 'static>(backend: B) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    pub fn from_arc(backend: Arc<dyn TableBackend>) -> Self {
        Self {
            backend,
            serializer: JsonSerializer,
            config: TableConfig::default(),
        }
    }
}

/// One encoded write, remembering which caller entity it came from.
struct PendingOp {
    index: usize,
    operation: BatchOperation,
}

impl<S: DataSerializer> TableAdapter<S> {
    pub fn with_serializer<S2: DataSerializer>(self, serializer: S2) -> TableAdapter<S2> {
        TableAdapter {
            backend: self.backend,
            serializer,
            config: self.config,
        }
    }

    pub fn with_config(mut self, config: TableConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn TableBackend> {
        &self.backend
    }

    // ----- tables -----

    /// Create a table. Returns `false` if it already existed.
    #[instrument(skip(self))]
    pub async fn create_table(&self, table: &str) -> TableResult<bool> {
        let result = self
            .config
            .retry
            .slow_instantiation("table.create_table", || self.backend.create_table(table))
            .await;
        match result {
            Ok(()) => {
                info!("Created table {}", table);
                Ok(true)
            }
            Err(err) if err.is_conflict() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Delete a table. Returns `false` if there was nothing to delete.
    #[instrument(skip(self))]
    pub async fn delete_table(&self, table: &str) -> TableResult<bool> {
        let result = self
            .config
            .retry
            .transient("table.delete_table", || self.backend.delete_table(table))
            .await;
        match result {
            Ok(()) => {
                info!("Deleted table {}", table);
                Ok(true)
            }
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_tables(&self) -> TableResult<Vec<String>> {
        Ok(self
            .config
            .retry
            .transient("table.list_tables", || self.backend.list_tables())
            .await?)
    }

    // ----- reads -----

    /// Lazily read the entities matching `filter`, one page per round trip.
    /// A missing table yields an empty stream.
    pub fn query<T>(&self, table: &str, filter: RowFilter) -> BoxStream<'static, TableResult<CloudEntity<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let retry = self.config.retry.clone();
        let serializer = self.serializer.clone();
        let table = table.to_string();

        let stream = async_stream::stream! {
            if let RowFilter::RowKeys { row_keys, .. } = &filter {
                if row_keys.is_empty() {
                    return;
                }
            }

            let mut continuation: Option<Continuation> = None;
            loop {
                let token = continuation.take();
                let page = retry
                    .transient("table.query", || backend.query(&table, &filter, token.clone()))
                    .await;
                let page = match page {
                    Ok(page) => page,
                    Err(err) if err.is_not_found() => return,
                    Err(err) => {
                        yield Err(TableError::from(err));
                        return;
                    }
                };
                for row in page.rows {
                    yield decode_row(&serializer, row);
                }
                match page.continuation {
                    Some(next) => continuation = Some(next),
                    None => return,
                }
            }
        };
        Box::pin(stream)
    }

    /// Every entity of the table.
    pub fn get<T>(&self, table: &str) -> BoxStream<'static, TableResult<CloudEntity<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.query(table, RowFilter::All)
    }

    pub fn get_partition<T>(&self, table: &str, partition_key: &str) -> BoxStream<'static, TableResult<CloudEntity<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.query(table, RowFilter::Partition(partition_key.to_string()))
    }

    /// Entities of one partition with `start <= row_key < end`.
    pub fn get_range<T>(
        &self,
        table: &str,
        partition_key: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> BoxStream<'static, TableResult<CloudEntity<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.query(
            table,
            RowFilter::RowRange {
                partition_key: partition_key.to_string(),
                start: start.map(str::to_string),
                end: end.map(str::to_string),
            },
        )
    }

    /// Entities of one partition by row key. Missing keys are skipped.
    pub fn get_rows<T, I, K>(&self, table: &str, partition_key: &str, row_keys: I) -> BoxStream<'static, TableResult<CloudEntity<T>>>
    where
        T: DeserializeOwned + Send + 'static,
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.query(
            table,
            RowFilter::RowKeys {
                partition_key: partition_key.to_string(),
                row_keys: row_keys.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub async fn query_all<T>(&self, table: &str, filter: RowFilter) -> TableResult<Vec<CloudEntity<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.query(table, filter).try_collect().await
    }

    pub async fn get_all<T>(&self, table: &str) -> TableResult<Vec<CloudEntity<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.get(table).try_collect().await
    }

    pub async fn get_partition_all<T>(&self, table: &str, partition_key: &str) -> TableResult<Vec<CloudEntity<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.get_partition(table, partition_key).try_collect().await
    }

    pub async fn get_range_all<T>(
        &self,
        table: &str,
        partition_key: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> TableResult<Vec<CloudEntity<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.get_range(table, partition_key, start, end).try_collect().await
    }

    /// A single entity, or `None` when the row or the table is missing.
    pub async fn get_entity<T>(&self, table: &str, partition_key: &str, row_key: &str) -> TableResult<Option<CloudEntity<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let mut found = self
            .query_all(
                table,
                RowFilter::RowKeys {
                    partition_key: partition_key.to_string(),
                    row_keys: vec![row_key.to_string()],
                },
            )
            .await?;
        Ok(found.pop())
    }

    // ----- writes -----

    /// Insert new entities. Fails with [`TableError::Conflict`] if any of
    /// them already exists. Fresh etags are written back into `entities`.
    #[instrument(skip(self, entities), fields(count = entities.len()))]
    pub async fn insert<T>(&self, table: &str, entities: &mut [CloudEntity<T>]) -> TableResult<()>
    where
        T: Serialize + Send,
    {
        let mut pending = Vec::with_capacity(entities.len());
        for (index, entity) in entities.iter().enumerate() {
            pending.push(PendingOp {
                index,
                operation: BatchOperation::Insert(self.encode(entity)?),
            });
        }
        self.write_grouped(table, entities, pending).await
    }

    /// Replace existing entities.
    ///
    /// Without `force`, every entity must carry the etag it was read with and
    /// the write is refused if any of them changed since. With `force` the
    /// stored etags are ignored.
    #[instrument(skip(self, entities), fields(count = entities.len()))]
    pub async fn update<T>(&self, table: &str, entities: &mut [CloudEntity<T>], force: bool) -> TableResult<()>
    where
        T: Serialize + Send,
    {
        Self::require_etags(entities, force)?;

        let mut pending = Vec::with_capacity(entities.len());
        for (index, entity) in entities.iter().enumerate() {
            pending.push(PendingOp {
                index,
                operation: BatchOperation::Replace {
                    row: self.encode(entity)?,
                    if_match: if force { None } else { entity.etag.clone() },
                },
            });
        }
        self.write_grouped(table, entities, pending).await
    }

    /// Insert or replace, unconditionally.
    ///
    /// There is no native upsert: the existing row keys of each partition are
    /// read first, then absent rows are inserted and present ones replaced. A
    /// concurrent writer between the read and the write makes the batch fail
    /// with [`TableError::Conflict`].
    #[instrument(skip(self, entities), fields(count = entities.len()))]
    pub async fn upsert<T>(&self, table: &str, entities: &mut [CloudEntity<T>]) -> TableResult<()>
    where
        T: Serialize + Send,
    {
        let mut rows = Vec::with_capacity(entities.len());
        for entity in entities.iter() {
            rows.push(self.encode(entity)?);
        }

        let mut existing: HashSet<(String, String)> = HashSet::new();
        for (partition_key, indexes) in group_by_partition(entities) {
            let row_keys: Vec<String> = indexes
                .iter()
                .map(|&index| entities[index].row_key.clone())
                .collect();
            let keys = self.existing_row_keys(table, &partition_key, row_keys).await?;
            existing.extend(keys.into_iter().map(|row_key| (partition_key.clone(), row_key)));
        }

        let pending = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                let key = (entities[index].partition_key.clone(), row.row_key.clone());
                let operation = if existing.contains(&key) {
                    BatchOperation::Replace { row, if_match: None }
                } else {
                    BatchOperation::Insert(row)
                };
                PendingOp { index, operation }
            })
            .collect();
        self.write_grouped(table, entities, pending).await
    }

    /// Delete entities.
    ///
    /// Without `force`, every entity must carry its etag and the batch fails
    /// if any row changed or disappeared. With `force`, rows that are already
    /// gone are skipped.
    #[instrument(skip(self, entities), fields(count = entities.len()))]
    pub async fn delete<T>(&self, table: &str, entities: &[CloudEntity<T>], force: bool) -> TableResult<()>
    where
        T: Sync,
    {
        Self::require_etags(entities, force)?;

        let mut groups: BTreeMap<String, Vec<BatchOperation>> = BTreeMap::new();
        for entity in entities {
            groups
                .entry(entity.partition_key.clone())
                .or_default()
                .push(BatchOperation::Delete {
                    row_key: entity.row_key.clone(),
                    if_match: if force { None } else { entity.etag.clone() },
                });
        }

        for (partition_key, operations) in groups {
            self.delete_partition(table, &partition_key, operations, force).await?;
        }
        Ok(())
    }

    /// Unconditionally delete rows of one partition by key.
    pub async fn delete_keys<I, K>(&self, table: &str, partition_key: &str, row_keys: I) -> TableResult<()>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let operations = row_keys
            .into_iter()
            .map(|row_key| BatchOperation::Delete {
                row_key: row_key.into(),
                if_match: None,
            })
            .collect();
        self.delete_partition(table, partition_key, operations, true).await
    }

    // ----- internals -----

    fn require_etags<T>(entities: &[CloudEntity<T>], force: bool) -> TableResult<()> {
        if force {
            return Ok(());
        }
        match entities.iter().find(|entity| entity.etag.is_none()) {
            Some(entity) => Err(TableError::invalid(format!(
                "entity '{}/{}' has no etag; read it first or use force",
                entity.partition_key, entity.row_key
            ))),
            None => Ok(()),
        }
    }

    fn encode<T: Serialize>(&self, entity: &CloudEntity<T>) -> TableResult<RowData> {
        let data = Bytes::from(self.serializer.serialize(&entity.value)?);
        let slots = codec::split(&data)?;
        Ok(RowData {
            row_key: entity.row_key.clone(),
            properties: codec::to_properties(&slots),
        })
    }

    async fn existing_row_keys(
        &self,
        table: &str,
        partition_key: &str,
        row_keys: Vec<String>,
    ) -> TableResult<Vec<String>> {
        let filter = RowFilter::RowKeys {
            partition_key: partition_key.to_string(),
            row_keys,
        };
        let mut found = Vec::new();
        let mut continuation: Option<Continuation> = None;
        loop {
            let token = continuation.take();
            let page = self
                .config
                .retry
                .transient("table.query", || self.backend.query(table, &filter, token.clone()))
                .await;
            let page = match page {
                Ok(page) => page,
                Err(err) if err.is_not_found() => return Ok(found),
                Err(err) => return Err(err.into()),
            };
            found.extend(page.rows.into_iter().map(|row| row.row_key));
            match page.continuation {
                Some(next) => continuation = Some(next),
                None => return Ok(found),
            }
        }
    }

    /// Send `pending` grouped by partition and sliced to the batch limits,
    /// writing the returned etags back into `entities`.
    async fn write_grouped<T>(
        &self,
        table: &str,
        entities: &mut [CloudEntity<T>],
        pending: Vec<PendingOp>,
    ) -> TableResult<()> {
        let mut groups: BTreeMap<String, Vec<PendingOp>> = BTreeMap::new();
        for op in pending {
            groups
                .entry(entities[op.index].partition_key.clone())
                .or_default()
                .push(op);
        }

        for (partition_key, ops) in groups {
            for batch in self.slice(ops) {
                let indexes: Vec<usize> = batch.iter().map(|op| op.index).collect();
                let operations: Vec<BatchOperation> = batch.into_iter().map(|op| op.operation).collect();
                let etags = self.execute(table, &partition_key, operations).await?;
                for (index, etag) in indexes.into_iter().zip(etags) {
                    if etag.is_some() {
                        entities[index].etag = etag;
                    }
                }
            }
        }
        Ok(())
    }

    /// Cut one partition's operations into batches under both ceilings.
    fn slice(&self, ops: Vec<PendingOp>) -> Vec<Vec<PendingOp>> {
        let max_count = self.config.max_batch_entities.max(1);
        let max_payload = self.config.max_batch_payload_bytes;

        let mut batches = Vec::new();
        let mut current: Vec<PendingOp> = Vec::new();
        let mut payload = 0usize;
        for op in ops {
            let size = op.operation.payload_size();
            if !current.is_empty() && (current.len() == max_count || payload + size > max_payload) {
                batches.push(std::mem::take(&mut current));
                payload = 0;
            }
            payload += size;
            current.push(op);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    async fn delete_partition(
        &self,
        table: &str,
        partition_key: &str,
        operations: Vec<BatchOperation>,
        force: bool,
    ) -> TableResult<()> {
        let count = self.config.max_batch_entities.max(1);
        let mut operations = operations.into_iter().peekable();
        while operations.peek().is_some() {
            let batch: Vec<BatchOperation> = operations.by_ref().take(count).collect();
            let result = self
                .config
                .retry
                .transient("table.execute_batch", || {
                    self.backend.execute_batch(table, partition_key, batch.clone())
                })
                .await;
            match result {
                Ok(_) => {}
                Err(err) if force && err.kind() == RemoteErrorKind::TableNotFound => return Ok(()),
                Err(err) if force && err.kind() == RemoteErrorKind::EntityNotFound => {
                    debug!(
                        "Batch delete in {}/{} hit a missing row, deleting one by one",
                        table, partition_key
                    );
                    self.delete_one_by_one(table, partition_key, batch).await?;
                }
                Err(err) => return Err(conflict_or_remote(partition_key, err)),
            }
        }
        Ok(())
    }

    async fn delete_one_by_one(
        &self,
        table: &str,
        partition_key: &str,
        batch: Vec<BatchOperation>,
    ) -> TableResult<()> {
        for operation in batch {
            let result = self
                .config
                .retry
                .transient("table.execute_batch", || {
                    self.backend
                        .execute_batch(table, partition_key, vec![operation.clone()])
                })
                .await;
            match result {
                Ok(_) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(conflict_or_remote(partition_key, err)),
            }
        }
        Ok(())
    }

    /// Run one batch, creating the table and retrying once if it is missing.
    async fn execute(
        &self,
        table: &str,
        partition_key: &str,
        operations: Vec<BatchOperation>,
    ) -> TableResult<Vec<Option<String>>> {
        debug!(
            "Writing batch of {} operations to {}/{}",
            operations.len(),
            table,
            partition_key
        );
        match self.execute_once(table, partition_key, &operations).await {
            Err(err) if err.kind() == RemoteErrorKind::TableNotFound => {
                warn!("Table {} is missing, creating it before retrying", table);
                self.create_table(table).await?;
                self.execute_once(table, partition_key, &operations)
                    .await
                    .map_err(|err| conflict_or_remote(partition_key, err))
            }
            result => result.map_err(|err| conflict_or_remote(partition_key, err)),
        }
    }

    async fn execute_once(
        &self,
        table: &str,
        partition_key: &str,
        operations: &[BatchOperation],
    ) -> Result<Vec<Option<String>>, RemoteError> {
        self.config
            .retry
            .transient("table.execute_batch", || {
                self.backend
                    .execute_batch(table, partition_key, operations.to_vec())
            })
            .await
    }
}

fn group_by_partition<T>(entities: &[CloudEntity<T>]) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, entity) in entities.iter().enumerate() {
        groups
            .entry(entity.partition_key.clone())
            .or_default()
            .push(index);
    }
    groups
}

fn conflict_or_remote(partition_key: &str, err: RemoteError) -> TableError {
    match err.kind() {
        RemoteErrorKind::PreconditionFailed
        | RemoteErrorKind::AlreadyExists
        | RemoteErrorKind::EntityNotFound => TableError::Conflict {
            partition_key: partition_key.to_string(),
            source: err,
        },
        _ => TableError::Remote(err),
    }
}

fn decode_row<T, S>(serializer: &S, row: TableRow) -> TableResult<CloudEntity<T>>
where
    T: DeserializeOwned,
    S: DataSerializer,
{
    let slots = codec::from_properties(&row.properties)?;
    let data = codec::join(&slots)?;
    let value = serializer.deserialize(&data)?;
    Ok(CloudEntity {
        partition_key: row.partition_key,
        row_key: row.row_key,
        timestamp: Some(row.timestamp),
        etag: Some(row.etag),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryTableBackend;
    use cirrus_core::RetryPolicies;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Score {
        player: String,
        points: u32,
    }

    fn score(points: u32) -> Score {
        Score {
            player: "ada".into(),
            points,
        }
    }

    fn adapter() -> (Arc<MemoryTableBackend>, TableAdapter) {
        let backend = Arc::new(MemoryTableBackend::new());
        let adapter = TableAdapter::from_arc(backend.clone())
            .with_config(TableConfig::default().with_retry(RetryPolicies::immediate()));
        (backend, adapter)
    }

    fn op(size: usize) -> PendingOp {
        let mut properties = std::collections::BTreeMap::new();
        properties.insert("P0".to_string(), Bytes::from(vec![0u8; size]));
        PendingOp {
            index: 0,
            operation: BatchOperation::Insert(RowData {
                row_key: String::new(),
                properties,
            }),
        }
    }

    #[test]
    fn slicing_respects_count_and_payload() {
        let (_, adapter) = adapter();
        let adapter = adapter.with_config(
            TableConfig::default()
                .with_max_batch_entities(3)
                .with_max_batch_payload_bytes(100),
        );

        let by_count = adapter.slice((0..7).map(|_| op(1)).collect());
        assert_eq!(by_count.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 1]);

        let by_payload = adapter.slice((0..4).map(|_| op(40)).collect());
        assert_eq!(by_payload.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2]);

        // a single oversized operation still gets its own batch
        let lone = adapter.slice(vec![op(500)]);
        assert_eq!(lone.len(), 1);
    }

    #[tokio::test]
    async fn insert_creates_the_table_and_sets_etags() {
        let (backend, adapter) = adapter();
        let mut entities = vec![CloudEntity::new("p", "r1", score(1))];

        adapter.insert("scores", &mut entities).await.unwrap();
        assert!(entities[0].etag.is_some());
        assert_eq!(backend.row_count("scores"), 1);
        assert_eq!(backend.property_names("scores", "p", "r1"), vec!["P0"]);

        let read: CloudEntity<Score> = adapter
            .get_entity("scores", "p", "r1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.value, score(1));
        assert_eq!(read.etag, entities[0].etag);
    }

    #[tokio::test]
    async fn missing_table_reads_as_empty() {
        let (_, adapter) = adapter();
        let all: Vec<CloudEntity<Score>> = adapter.get_all("nope").await.unwrap();
        assert!(all.is_empty());
        assert!(adapter
            .get_entity::<Score>("nope", "p", "r")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_without_etag_is_rejected_before_any_call() {
        let (backend, adapter) = adapter();
        backend.faults().inject(RemoteErrorKind::Internal, 10);

        let mut entities = vec![CloudEntity::new("p", "r", score(1))];
        let err = adapter.update("scores", &mut entities, false).await.unwrap_err();
        assert!(matches!(err, TableError::Invalid(_)));
        assert_eq!(backend.faults().pending(), 10);
    }

    #[tokio::test]
    async fn oversized_entity_is_rejected_before_any_call() {
        let (backend, adapter) = adapter();
        backend.faults().inject(RemoteErrorKind::Internal, 10);

        let mut entities = vec![CloudEntity::new("p", "r", "x".repeat(codec::MAX_DATA_BYTES))];
        let err = adapter.insert("t", &mut entities).await.unwrap_err();
        assert!(matches!(err, TableError::EntityTooLarge { .. }));
        assert_eq!(backend.faults().pending(), 10);
    }

    #[tokio::test]
    async fn stale_update_fails_the_batch() {
        let (_, adapter) = adapter();
        let mut entities = vec![CloudEntity::new("p", "r", score(1))];
        adapter.insert("scores", &mut entities).await.unwrap();

        let mut stale = entities.clone();
        entities[0].value = score(2);
        adapter.update("scores", &mut entities, false).await.unwrap();

        stale[0].value = score(3);
        let err = adapter.update("scores", &mut stale, false).await.unwrap_err();
        assert!(err.is_conflict());

        adapter.update("scores", &mut stale, true).await.unwrap();
        let read: CloudEntity<Score> = adapter.get_entity("scores", "p", "r").await.unwrap().unwrap();
        assert_eq!(read.value, score(3));
    }

    #[tokio::test]
    async fn forced_delete_skips_missing_rows() {
        let (backend, adapter) = adapter();
        let mut entities = vec![
            CloudEntity::new("p", "a", score(1)),
            CloudEntity::new("p", "b", score(2)),
        ];
        adapter.insert("scores", &mut entities).await.unwrap();
        adapter.delete_keys("scores", "p", ["a"]).await.unwrap();

        adapter.delete("scores", &entities, true).await.unwrap();
        assert_eq!(backend.row_count("scores"), 0);

        // nothing left and no table at all: still fine when forced
        adapter.delete("gone", &entities, true).await.unwrap();
    }
}
