//! # cirrus-queue: queue messages without the queue's limits
//!
//! The remote queue service caps messages at a few kilobytes and delivers them
//! at least once. [`QueueAdapter`] hides both facts from callers:
//!
//! - **Overflow**: payloads too large to send inline are written to blob
//!   storage and a small wrapper is queued in their place; `get` resolves it
//!   transparently, `delete` and `persist` clean the blob up.
//! - **Checkout tracking**: callers dispose of messages by handing back the
//!   value they received; the adapter remembers which delivery handle(s)
//!   belong to it.
//! - **Poison quarantine**: messages dequeued more than the allowed number of
//!   times are moved to the `failing-messages` store with a reason.
//! - **Persist / restore**: any checked-out message can be parked in a named
//!   store and later put back on its queue.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cirrus_blob::{BlobAdapter, MemoryBlobStore};
//! use cirrus_queue::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> QueueResult<()> {
//! let queues = QueueAdapter::new(
//!     Arc::new(MemoryQueueBackend::new()),
//!     BlobAdapter::new(MemoryBlobStore::new()),
//! );
//!
//! queues.put("orders", "order-42").await?;
//! let batch: Vec<String> = queues.get("orders", 10, Duration::from_secs(30), 5).await?;
//! for order in &batch {
//!     queues.delete(order).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backend;
pub mod checkout;
mod config;
mod error;
pub mod types;

pub use adapter::QueueAdapter;
pub use backend::{MessageHandle, QueueBackend, RawMessage};
pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use types::{Envelope, MessageKey, MessageWrapper, PersistedEntry, PersistedMessage};

#[cfg(feature = "memory")]
pub use backend::memory::MemoryQueueBackend;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        PersistedEntry, PersistedMessage, QueueAdapter, QueueBackend, QueueConfig, QueueError,
        QueueResult,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryQueueBackend;
}
