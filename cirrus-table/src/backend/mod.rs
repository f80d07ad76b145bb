#[cfg(feature = "memory")]
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cirrus_core::RemoteResult;

use crate::RowFilter;

/// A native table row.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub partition_key: String,
    pub row_key: String,
    pub timestamp: DateTime<Utc>,
    pub etag: String,
    pub properties: BTreeMap<String, Bytes>,
}

/// Row content sent with a write.
#[derive(Debug, Clone, PartialEq)]
pub struct RowData {
    pub row_key: String,
    pub properties: BTreeMap<String, Bytes>,
}

impl RowData {
    /// Approximate wire size, used to keep batches under the payload ceiling.
    pub fn payload_size(&self) -> usize {
        self.row_key.len()
            + self
                .properties
                .iter()
                .map(|(name, value)| name.len() + value.len())
                .sum::<usize>()
    }
}

/// One operation of a same-partition batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    /// Fails with `AlreadyExists` if the row is present.
    Insert(RowData),
    /// Replace an existing row; `if_match: None` skips the etag check.
    Replace { row: RowData, if_match: Option<String> },
    /// Remove an existing row; `if_match: None` skips the etag check.
    Delete { row_key: String, if_match: Option<String> },
}

impl BatchOperation {
    pub fn row_key(&self) -> &str {
        match self {
            Self::Insert(row) | Self::Replace { row, .. } => &row.row_key,
            Self::Delete { row_key, .. } => row_key,
        }
    }

    pub fn payload_size(&self) -> usize {
        match self {
            Self::Insert(row) | Self::Replace { row, .. } => row.payload_size(),
            Self::Delete { row_key, .. } => row_key.len(),
        }
    }
}

/// Resume point of a paged query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub next_partition_key: String,
    pub next_row_key: String,
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub rows: Vec<TableRow>,
    pub continuation: Option<Continuation>,
}

/// Backend trait for wide-column table primitives.
///
/// Batches are atomic: every operation targets the same partition and either
/// all apply or none do. Backends enforce the platform limits (operations per
/// batch, batch payload, property and row size) and report them as
/// `InvalidInput` / `RequestTooLarge`; missing tables surface as
/// `TableNotFound`, etag mismatches as `PreconditionFailed`.
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Fails with `AlreadyExists` if the table is present.
    async fn create_table(&self, table: &str) -> RemoteResult<()>;

    /// Fails with `TableNotFound` if the table is missing.
    async fn delete_table(&self, table: &str) -> RemoteResult<()>;

    async fn list_tables(&self) -> RemoteResult<Vec<String>>;

    /// Rows matching `filter` in (partition key, row key) order, one page at a time.
    async fn query(
        &self,
        table: &str,
        filter: &RowFilter,
        continuation: Option<Continuation>,
    ) -> RemoteResult<QueryPage>;

    /// Apply `operations` atomically. Returns the new etag of each inserted
    /// or replaced row, `None` for deletes, in operation order.
    async fn execute_batch(
        &self,
        table: &str,
        partition_key: &str,
        operations: Vec<BatchOperation>,
    ) -> RemoteResult<Vec<Option<String>>>;
}
