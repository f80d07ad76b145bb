//! # cirrus-lease: run a periodic job once across a fleet
//!
//! Every worker asks [`LeaseCoordinator::try_acquire`] (or wraps its job in
//! [`LeaseCoordinator::run_if_due`]) on its own schedule. The job's state
//! record lives in blob storage; acquisition is an etag-checked update of
//! that record, so of all workers racing for the same run only one wins.
//!
//! ```rust
//! use std::time::Duration;
//! use cirrus_blob::{BlobAdapter, MemoryBlobStore};
//! use cirrus_lease::prelude::*;
//!
//! # #[tokio::main]
//! # async fn main() -> LeaseResult<()> {
//! let coordinator = LeaseCoordinator::new(BlobAdapter::new(MemoryBlobStore::new()), "worker-1");
//! let schedule = JobSchedule::new(Duration::from_secs(3600), Duration::from_secs(300));
//!
//! let ran = coordinator
//!     .run_if_due("nightly-report", &schedule, |_grant| async { "done" })
//!     .await?;
//! assert_eq!(ran, Some("done"));
//! # Ok(())
//! # }
//! ```

mod config;
pub mod coordinator;
mod error;
pub mod state;

pub use config::LeaseConfig;
pub use coordinator::{Acquisition, JobSchedule, LeaseCoordinator, LeaseGrant};
pub use error::{LeaseError, LeaseResult};
pub use state::{LeaseState, ScheduledJobState};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Acquisition, JobSchedule, LeaseConfig, LeaseCoordinator, LeaseError, LeaseGrant,
        LeaseResult, ScheduledJobState,
    };
}
