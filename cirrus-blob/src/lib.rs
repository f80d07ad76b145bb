//! # cirrus-blob: versioned blob storage
//!
//! `cirrus-blob` turns a bare remote blob store into the optimistic
//! concurrency primitive the rest of the workspace is built on.
//!
//! ## Key Features
//!
//! - **Version tokens**: every successful write produces a fresh [`ETag`]
//! - **Compare-and-swap**: writes guarded by an expected token fail softly
//!   (`None`) instead of erroring
//! - **Atomic update**: single-shot read-modify-write with
//!   [`UpdateOutcome::Conflict`] left for the caller to retry
//! - **Container auto-creation**: a write into a missing container creates it
//!   and retries once
//! - **Storage agnostic**: anything implementing [`BlobStore`]; a
//!   [`MemoryBlobStore`] ships for tests and development
//!
//! ## Quick Start
//!
//! ```rust
//! use cirrus_blob::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let blobs = BlobAdapter::new(MemoryBlobStore::new());
//!
//! let outcome = blobs
//!     .atomic_update::<u64, _>("counters", "visits", |current| Some(current.unwrap_or(0) + 1))
//!     .await?;
//! assert_eq!(outcome.into_value(), Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Queue / Lease   │  ← overflow blobs, job state
//! ├─────────────────┤
//! │   BlobAdapter   │  ← retries, CAS, typed values
//! ├─────────────────┤
//! │   BlobStore     │  ← storage primitive
//! └─────────────────┘
//! ```

pub mod adapter;
mod config;
mod error;
mod memory;
pub mod store;
mod types;

// Re-export main types for clean API
pub use adapter::BlobAdapter;
pub use config::BlobConfig;
pub use error::{BlobError, BlobResult};
pub use memory::MemoryBlobStore;
pub use store::{BlobPage, BlobStore, PutCondition, StoredBlob};
pub use types::{unique_blob_name, ETag, Modified, UpdateOutcome, Versioned};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobAdapter, BlobConfig, BlobError, BlobResult, BlobStore, ETag, MemoryBlobStore, Modified,
        UpdateOutcome, Versioned,
    };
}
