#[cfg(feature = "memory")]
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cirrus_core::RemoteResult;
use serde::{Deserialize, Serialize};

/// Store-issued delivery handle.
///
/// `receipt` changes on every delivery and every visibility update; only the
/// latest receipt can delete or re-time the message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub message_id: String,
    pub receipt: String,
}

/// A message as delivered by the queue service.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub handle: MessageHandle,
    pub payload: Bytes,
    /// Number of deliveries so far, including this one.
    pub dequeue_count: u32,
    pub inserted_at: DateTime<Utc>,
}

/// Backend trait for queue storage primitives.
///
/// Messages are delivered at least once: a delivered message becomes
/// invisible for the requested timeout and reappears unless deleted.
/// Backends report `QueueNotFound`, `MessageNotFound` (stale or unknown
/// receipt), `AlreadyExists`, `BeingDeleted`, `RequestTooLarge` and the
/// transient kinds through `RemoteError`, and never retry on their own.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Fails with `AlreadyExists` if the queue is present.
    async fn create_queue(&self, queue: &str) -> RemoteResult<()>;

    /// Fails with `QueueNotFound` if the queue is missing.
    async fn delete_queue(&self, queue: &str) -> RemoteResult<()>;

    async fn list_queues(&self, prefix: &str) -> RemoteResult<Vec<String>>;

    async fn put_message(&self, queue: &str, payload: Bytes) -> RemoteResult<()>;

    /// Deliver up to `count` visible messages, hiding each for `visibility_timeout`.
    async fn get_messages(
        &self,
        queue: &str,
        count: usize,
        visibility_timeout: Duration,
    ) -> RemoteResult<Vec<RawMessage>>;

    async fn delete_message(&self, queue: &str, handle: &MessageHandle) -> RemoteResult<()>;

    /// Make the message visible again after `timeout` (zero: immediately).
    /// Returns the handle carrying the new receipt.
    async fn update_visibility(
        &self,
        queue: &str,
        handle: &MessageHandle,
        timeout: Duration,
    ) -> RemoteResult<MessageHandle>;

    /// Remove every message, visible or not.
    async fn clear(&self, queue: &str) -> RemoteResult<()>;

    async fn approximate_count(&self, queue: &str) -> RemoteResult<usize>;

    /// Insertion time of the oldest visible message, without delivering it.
    async fn peek_oldest(&self, queue: &str) -> RemoteResult<Option<DateTime<Utc>>>;
}
