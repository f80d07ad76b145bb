//! # cirrus-table: wide entities on a wide-column store
//!
//! A native table property holds at most 64KB. [`TableAdapter`] serializes
//! each value and spreads it over the binary columns `P0`..`P14` of a single
//! row (see [`codec`]), so one entity can be close to 960KB.
//!
//! Writes (`insert`, `update`, `upsert`, `delete`) are grouped by partition
//! key and sliced into batches under the service's entity-count and payload
//! limits. `update` and `delete` check etags unless `force` is set. Reads are
//! lazy streams that page through the table; a missing table reads as empty,
//! and a missing table on write is created and the write retried.
//!
//! ```rust
//! use cirrus_table::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Invoice {
//!     total: u64,
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> TableResult<()> {
//! let tables = TableAdapter::new(MemoryTableBackend::new());
//!
//! let mut batch = vec![CloudEntity::new("acme", "inv-1", Invoice { total: 120 })];
//! tables.insert("invoices", &mut batch).await?;
//!
//! let invoices: Vec<CloudEntity<Invoice>> = tables.get_partition_all("invoices", "acme").await?;
//! assert_eq!(invoices[0].value.total, 120);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backend;
pub mod codec;
mod config;
mod error;
mod types;

pub use adapter::TableAdapter;
pub use backend::{BatchOperation, Continuation, QueryPage, RowData, TableBackend, TableRow};
pub use config::TableConfig;
pub use error::{TableError, TableResult};
pub use types::{CloudEntity, RowFilter};

#[cfg(feature = "memory")]
pub use backend::memory::MemoryTableBackend;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{CloudEntity, RowFilter, TableAdapter, TableBackend, TableConfig, TableError, TableResult};

    #[cfg(feature = "memory")]
    pub use crate::MemoryTableBackend;
}
