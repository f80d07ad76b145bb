//! cirrus-core: shared plumbing for the cirrus storage providers.
//!
//! Every provider crate (`cirrus-blob`, `cirrus-queue`, `cirrus-table`,
//! `cirrus-lease`) talks to a remote primitive through a backend trait. The
//! pieces those providers share live here:
//!
//! - [`RemoteError`] / [`RemoteErrorKind`]: the error every backend returns,
//!   classified so providers can tell not-found, conflicts, transient faults
//!   and slow re-creation apart.
//! - [`RetryPolicy`] / [`RetryPolicies`]: injected retry values, no globals.
//! - [`DataSerializer`]: the pluggable payload serializer.
//! - [`Clock`]: time source, swappable in tests.
//! - [`StorageConfig`]: string key/value configuration with env overrides.

use futures_core::Stream;
use std::pin::Pin;

pub mod clock;
pub mod config;
pub mod errors;
pub mod faults;
pub mod observability;
pub mod retry;
pub mod serializer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigSnapshot, StorageConfig};
pub use errors::{RemoteError, RemoteErrorKind, RemoteResult};
pub use faults::FaultInjector;
pub use retry::{Backoff, RetryPolicies, RetryPolicy};
pub use serializer::{DataSerializer, JsonSerializer, SerializationError};

#[cfg(feature = "msgpack")]
pub use serializer::MsgPackSerializer;

/// Boxed stream used by providers for lazily paged listings.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;
