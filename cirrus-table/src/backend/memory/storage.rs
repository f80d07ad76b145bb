use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cirrus_core::{Clock, FaultInjector, RemoteError, RemoteErrorKind, RemoteResult, SystemClock};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::backend::{
    BatchOperation, Continuation, QueryPage, RowData, TableBackend, TableRow,
};
use crate::RowFilter;

pub const MAX_BATCH_OPERATIONS: usize = 100;
pub const MAX_BATCH_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;
pub const MAX_PROPERTY_BYTES: usize = 64 * 1024;
pub const MAX_ROW_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
struct StoredRow {
    etag: String,
    timestamp: DateTime<Utc>,
    properties: BTreeMap<String, Bytes>,
}

/// (partition key, row key) -> row, so scans come out in key order
type MemoryTable = BTreeMap<(String, String), StoredRow>;

/// In-memory table service for testing and development.
///
/// Enforces the same limits as the hosted service: 100 operations and 4MiB
/// per batch, 64KiB per property, 1MiB per row, one partition per batch and
/// no repeated row key inside a batch.
pub struct MemoryTableBackend {
    tables: RwLock<HashMap<String, MemoryTable>>,
    recently_deleted: RwLock<HashMap<String, u32>>,
    deletion_lag: u32,
    page_size: usize,
    clock: Arc<dyn Clock>,
    faults: FaultInjector,
}

impl MemoryTableBackend {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            recently_deleted: RwLock::new(HashMap::new()),
            deletion_lag: 0,
            page_size: 1000,
            clock: Arc::new(SystemClock),
            faults: FaultInjector::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Rows per query page; smaller values exercise continuation handling.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// After a table is deleted, the next `attempts` creations of the same
    /// name fail with `BeingDeleted`.
    pub fn with_deletion_lag(mut self, attempts: u32) -> Self {
        self.deletion_lag = attempts;
        self
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Rows stored in `table` (0 when missing).
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map(BTreeMap::len).unwrap_or(0)
    }

    /// Property names of one row, for inspecting the column layout.
    pub fn property_names(&self, table: &str, partition_key: &str, row_key: &str) -> Vec<String> {
        self.tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(&(partition_key.to_string(), row_key.to_string())))
            .map(|row| row.properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn new_etag(timestamp: DateTime<Utc>) -> String {
        format!(
            "W/\"datetime'{}'-{}\"",
            timestamp.format("%Y-%m-%dT%H:%M:%S%.fZ"),
            Uuid::new_v4().simple()
        )
    }

    fn validate_shape(partition_key: &str, operations: &[BatchOperation]) -> RemoteResult<()> {
        if operations.is_empty() {
            return Err(RemoteError::new(
                RemoteErrorKind::InvalidInput,
                "a batch needs at least one operation",
            ));
        }
        if operations.len() > MAX_BATCH_OPERATIONS {
            return Err(RemoteError::new(
                RemoteErrorKind::InvalidInput,
                format!(
                    "batch of {} operations exceeds the limit of {}",
                    operations.len(),
                    MAX_BATCH_OPERATIONS
                ),
            ));
        }

        let payload: usize = operations.iter().map(BatchOperation::payload_size).sum();
        if payload > MAX_BATCH_PAYLOAD_BYTES {
            return Err(RemoteError::new(
                RemoteErrorKind::RequestTooLarge,
                format!("batch payload of {} bytes is too large", payload),
            ));
        }

        let mut seen = HashSet::new();
        for operation in operations {
            if !seen.insert(operation.row_key()) {
                return Err(RemoteError::new(
                    RemoteErrorKind::InvalidInput,
                    format!(
                        "row '{}/{}' appears twice in one batch",
                        partition_key,
                        operation.row_key()
                    ),
                ));
            }
            if let BatchOperation::Insert(row) | BatchOperation::Replace { row, .. } = operation {
                Self::validate_row(row)?;
            }
        }
        Ok(())
    }

    fn validate_row(row: &RowData) -> RemoteResult<()> {
        if let Some((name, value)) = row
            .properties
            .iter()
            .find(|(_, value)| value.len() > MAX_PROPERTY_BYTES)
        {
            return Err(RemoteError::new(
                RemoteErrorKind::RequestTooLarge,
                format!("property '{}' holds {} bytes", name, value.len()),
            ));
        }
        if row.payload_size() > MAX_ROW_BYTES {
            return Err(RemoteError::new(
                RemoteErrorKind::RequestTooLarge,
                format!("row '{}' is {} bytes", row.row_key, row.payload_size()),
            ));
        }
        Ok(())
    }

    fn check_etag(
        partition_key: &str,
        row_key: &str,
        stored: &StoredRow,
        if_match: &Option<String>,
    ) -> RemoteResult<()> {
        match if_match {
            Some(expected) if *expected != stored.etag => Err(RemoteError::precondition_failed(
                format!("etag mismatch on row '{}/{}'", partition_key, row_key),
            )),
            _ => Ok(()),
        }
    }

    fn entity_not_found(partition_key: &str, row_key: &str) -> RemoteError {
        RemoteError::new(
            RemoteErrorKind::EntityNotFound,
            format!("row '{}/{}' not found", partition_key, row_key),
        )
    }
}

impl Default for MemoryTableBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TableBackend for MemoryTableBackend {
    async fn create_table(&self, table: &str) -> RemoteResult<()> {
        self.faults.check("create_table")?;

        {
            let mut deleted = self.recently_deleted.write();
            if let Some(remaining) = deleted.get_mut(table) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RemoteError::new(
                        RemoteErrorKind::BeingDeleted,
                        format!("table '{}' is being deleted", table),
                    ));
                }
                deleted.remove(table);
            }
        }

        let mut tables = self.tables.write();
        if tables.contains_key(table) {
            return Err(RemoteError::already_exists(format!(
                "table '{}' already exists",
                table
            )));
        }
        tables.insert(table.to_string(), MemoryTable::new());
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> RemoteResult<()> {
        self.faults.check("delete_table")?;

        if self.tables.write().remove(table).is_none() {
            return Err(RemoteError::table_not_found(table));
        }
        if self.deletion_lag > 0 {
            self.recently_deleted
                .write()
                .insert(table.to_string(), self.deletion_lag);
        }
        Ok(())
    }

    async fn list_tables(&self) -> RemoteResult<Vec<String>> {
        self.faults.check("list_tables")?;

        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn query(
        &self,
        table: &str,
        filter: &RowFilter,
        continuation: Option<Continuation>,
    ) -> RemoteResult<QueryPage> {
        self.faults.check("query")?;

        let tables = self.tables.read();
        let rows = tables
            .get(table)
            .ok_or_else(|| RemoteError::table_not_found(table))?;

        let start = continuation
            .map(|c| (c.next_partition_key, c.next_row_key))
            .unwrap_or_default();

        let mut matching = rows
            .range(start..)
            .filter(|((pk, rk), _)| filter.matches(pk, rk));

        let mut page = QueryPage::default();
        for ((pk, rk), row) in matching.by_ref().take(self.page_size) {
            page.rows.push(TableRow {
                partition_key: pk.clone(),
                row_key: rk.clone(),
                timestamp: row.timestamp,
                etag: row.etag.clone(),
                properties: row.properties.clone(),
            });
        }
        page.continuation = matching.next().map(|((pk, rk), _)| Continuation {
            next_partition_key: pk.clone(),
            next_row_key: rk.clone(),
        });
        Ok(page)
    }

    async fn execute_batch(
        &self,
        table: &str,
        partition_key: &str,
        operations: Vec<BatchOperation>,
    ) -> RemoteResult<Vec<Option<String>>> {
        self.faults.check("execute_batch")?;
        Self::validate_shape(partition_key, &operations)?;

        let mut tables = self.tables.write();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| RemoteError::table_not_found(table))?;

        // row keys are unique within the batch, so every check sees pre-batch state
        for operation in &operations {
            let key = (partition_key.to_string(), operation.row_key().to_string());
            match (operation, rows.get(&key)) {
                (BatchOperation::Insert(_), Some(_)) => {
                    return Err(RemoteError::already_exists(format!(
                        "row '{}/{}' already exists",
                        partition_key,
                        operation.row_key()
                    )));
                }
                (BatchOperation::Insert(_), None) => {}
                (BatchOperation::Replace { .. }, None) | (BatchOperation::Delete { .. }, None) => {
                    return Err(Self::entity_not_found(partition_key, operation.row_key()));
                }
                (BatchOperation::Replace { if_match, .. }, Some(stored))
                | (BatchOperation::Delete { if_match, .. }, Some(stored)) => {
                    Self::check_etag(partition_key, operation.row_key(), stored, if_match)?;
                }
            }
        }

        let now = self.clock.now();
        let mut etags = Vec::with_capacity(operations.len());
        for operation in operations {
            match operation {
                BatchOperation::Insert(row) | BatchOperation::Replace { row, .. } => {
                    let etag = Self::new_etag(now);
                    rows.insert(
                        (partition_key.to_string(), row.row_key),
                        StoredRow {
                            etag: etag.clone(),
                            timestamp: now,
                            properties: row.properties,
                        },
                    );
                    etags.push(Some(etag));
                }
                BatchOperation::Delete { row_key, .. } => {
                    rows.remove(&(partition_key.to_string(), row_key));
                    etags.push(None);
                }
            }
        }
        Ok(etags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(row_key: &str, payload: &'static [u8]) -> RowData {
        let mut properties = BTreeMap::new();
        properties.insert("P0".to_string(), Bytes::from_static(payload));
        RowData {
            row_key: row_key.to_string(),
            properties,
        }
    }

    async fn backend_with_table() -> MemoryTableBackend {
        let backend = MemoryTableBackend::new();
        backend.create_table("t").await.unwrap();
        backend
    }

    #[tokio::test]
    async fn failing_batch_applies_nothing() {
        let backend = backend_with_table().await;
        backend
            .execute_batch("t", "p", vec![BatchOperation::Insert(row("b", b"1"))])
            .await
            .unwrap();

        let err = backend
            .execute_batch(
                "t",
                "p",
                vec![
                    BatchOperation::Insert(row("a", b"1")),
                    BatchOperation::Insert(row("b", b"2")),
                ],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::AlreadyExists);
        assert_eq!(backend.row_count("t"), 1);
    }

    #[tokio::test]
    async fn replace_checks_the_etag() {
        let backend = backend_with_table().await;
        let etags = backend
            .execute_batch("t", "p", vec![BatchOperation::Insert(row("a", b"1"))])
            .await
            .unwrap();
        let etag = etags[0].clone();

        let replaced = backend
            .execute_batch(
                "t",
                "p",
                vec![BatchOperation::Replace {
                    row: row("a", b"2"),
                    if_match: etag.clone(),
                }],
            )
            .await
            .unwrap();
        assert_ne!(replaced[0], etag);

        let err = backend
            .execute_batch(
                "t",
                "p",
                vec![BatchOperation::Delete {
                    row_key: "a".into(),
                    if_match: etag,
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::PreconditionFailed);
    }

    #[tokio::test]
    async fn batch_limits_are_enforced() {
        let backend = backend_with_table().await;

        let too_many = (0..=MAX_BATCH_OPERATIONS)
            .map(|i| BatchOperation::Insert(row(&i.to_string(), b"x")))
            .collect();
        let err = backend.execute_batch("t", "p", too_many).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::InvalidInput);

        let twice = vec![
            BatchOperation::Insert(row("a", b"1")),
            BatchOperation::Delete {
                row_key: "a".into(),
                if_match: None,
            },
        ];
        let err = backend.execute_batch("t", "p", twice).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::InvalidInput);

        let mut big = RowData {
            row_key: "big".into(),
            properties: BTreeMap::new(),
        };
        big.properties
            .insert("P0".into(), Bytes::from(vec![0u8; MAX_PROPERTY_BYTES + 1]));
        let err = backend
            .execute_batch("t", "p", vec![BatchOperation::Insert(big)])
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::RequestTooLarge);
    }

    #[tokio::test]
    async fn queries_page_in_key_order() {
        let backend = MemoryTableBackend::new().with_page_size(2);
        backend.create_table("t").await.unwrap();
        for pk in ["p1", "p2"] {
            let ops = ["c", "a", "b"]
                .iter()
                .map(|rk| BatchOperation::Insert(row(rk, b"v")))
                .collect();
            backend.execute_batch("t", pk, ops).await.unwrap();
        }

        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let page = backend
                .query("t", &RowFilter::All, continuation)
                .await
                .unwrap();
            assert!(page.rows.len() <= 2);
            keys.extend(
                page.rows
                    .into_iter()
                    .map(|r| format!("{}/{}", r.partition_key, r.row_key)),
            );
            continuation = page.continuation;
            if continuation.is_none() {
                break;
            }
        }
        assert_eq!(keys, vec!["p1/a", "p1/b", "p1/c", "p2/a", "p2/b", "p2/c"]);
    }

    #[tokio::test]
    async fn missing_table_is_reported() {
        let backend = MemoryTableBackend::new();
        let err = backend
            .query("nope", &RowFilter::All, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::TableNotFound);
    }
}
