use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cirrus_core::{Clock, FaultInjector, RemoteError, RemoteErrorKind, RemoteResult, SystemClock};
use parking_lot::RwLock;
use ulid::Ulid;
use uuid::Uuid;

use crate::backend::{MessageHandle, QueueBackend, RawMessage};

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    payload: Bytes,
    dequeue_count: u32,
    inserted_at: DateTime<Utc>,
    visible_at: DateTime<Utc>,
    receipt: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryQueue {
    next_seq: u64,
    /// seq -> message, so iteration follows insertion order
    messages: BTreeMap<u64, StoredMessage>,
}

impl MemoryQueue {
    fn find_mut(&mut self, handle: &MessageHandle) -> Option<(u64, &mut StoredMessage)> {
        self.messages
            .iter_mut()
            .find(|(_, message)| message.id == handle.message_id)
            .map(|(seq, message)| (*seq, message))
    }
}

/// In-memory queue service for testing and development.
///
/// Visibility windows are evaluated against the injected [`Clock`], so tests
/// driving a `ManualClock` can make in-flight messages reappear on demand.
pub struct MemoryQueueBackend {
    queues: RwLock<HashMap<String, MemoryQueue>>,
    recently_deleted: RwLock<HashMap<String, u32>>,
    deletion_lag: u32,
    max_message_bytes: usize,
    clock: Arc<dyn Clock>,
    faults: FaultInjector,
}

impl MemoryQueueBackend {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            recently_deleted: RwLock::new(HashMap::new()),
            deletion_lag: 0,
            max_message_bytes: 64 * 1024,
            clock: Arc::new(SystemClock),
            faults: FaultInjector::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Reject raw messages larger than this with `RequestTooLarge`.
    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    /// After a queue is deleted, the next `attempts` creations of the same
    /// name fail with `BeingDeleted`.
    pub fn with_deletion_lag(mut self, attempts: u32) -> Self {
        self.deletion_lag = attempts;
        self
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Total messages in `queue`, visible or not (0 when missing).
    pub fn message_count(&self, queue: &str) -> usize {
        self.queues
            .read()
            .get(queue)
            .map(|q| q.messages.len())
            .unwrap_or(0)
    }

    /// Dequeue counters of every message in `queue`, in insertion order.
    pub fn dequeue_counts(&self, queue: &str) -> Vec<u32> {
        self.queues
            .read()
            .get(queue)
            .map(|q| q.messages.values().map(|m| m.dequeue_count).collect())
            .unwrap_or_default()
    }

    fn to_chrono(duration: Duration) -> chrono::Duration {
        chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
    }

    fn stale_receipt(queue: &str, handle: &MessageHandle) -> RemoteError {
        RemoteError::new(
            RemoteErrorKind::MessageNotFound,
            format!(
                "message '{}' in queue '{}' not found or receipt is stale",
                handle.message_id, queue
            ),
        )
    }
}

impl Default for MemoryQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
    async fn create_queue(&self, queue: &str) -> RemoteResult<()> {
        self.faults.check("create_queue")?;

        {
            let mut deleted = self.recently_deleted.write();
            if let Some(remaining) = deleted.get_mut(queue) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(RemoteError::new(
                        RemoteErrorKind::BeingDeleted,
                        format!("queue '{}' is being deleted", queue),
                    ));
                }
                deleted.remove(queue);
            }
        }

        let mut queues = self.queues.write();
        if queues.contains_key(queue) {
            return Err(RemoteError::already_exists(format!(
                "queue '{}' already exists",
                queue
            )));
        }
        queues.insert(queue.to_string(), MemoryQueue::default());
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> RemoteResult<()> {
        self.faults.check("delete_queue")?;

        if self.queues.write().remove(queue).is_none() {
            return Err(RemoteError::queue_not_found(queue));
        }
        if self.deletion_lag > 0 {
            self.recently_deleted
                .write()
                .insert(queue.to_string(), self.deletion_lag);
        }
        Ok(())
    }

    async fn list_queues(&self, prefix: &str) -> RemoteResult<Vec<String>> {
        self.faults.check("list_queues")?;

        let mut names: Vec<String> = self
            .queues
            .read()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }

    async fn put_message(&self, queue: &str, payload: Bytes) -> RemoteResult<()> {
        self.faults.check("put_message")?;

        if payload.len() > self.max_message_bytes {
            return Err(RemoteError::new(
                RemoteErrorKind::RequestTooLarge,
                format!(
                    "message of {} bytes exceeds the {} byte limit",
                    payload.len(),
                    self.max_message_bytes
                ),
            ));
        }

        let now = self.clock.now();
        let mut queues = self.queues.write();
        let q = queues
            .get_mut(queue)
            .ok_or_else(|| RemoteError::queue_not_found(queue))?;

        let seq = q.next_seq;
        q.next_seq += 1;
        q.messages.insert(
            seq,
            StoredMessage {
                id: Ulid::new().to_string(),
                payload,
                dequeue_count: 0,
                inserted_at: now,
                visible_at: now,
                receipt: None,
            },
        );
        Ok(())
    }

    async fn get_messages(
        &self,
        queue: &str,
        count: usize,
        visibility_timeout: Duration,
    ) -> RemoteResult<Vec<RawMessage>> {
        self.faults.check("get_messages")?;

        let now = self.clock.now();
        let hidden_until = now + Self::to_chrono(visibility_timeout);
        let mut queues = self.queues.write();
        let q = queues
            .get_mut(queue)
            .ok_or_else(|| RemoteError::queue_not_found(queue))?;

        let mut delivered = Vec::new();
        for message in q.messages.values_mut() {
            if delivered.len() >= count {
                break;
            }
            if message.visible_at > now {
                continue;
            }

            let receipt = Uuid::new_v4().to_string();
            message.dequeue_count += 1;
            message.visible_at = hidden_until;
            message.receipt = Some(receipt.clone());

            delivered.push(RawMessage {
                handle: MessageHandle {
                    message_id: message.id.clone(),
                    receipt,
                },
                payload: message.payload.clone(),
                dequeue_count: message.dequeue_count,
                inserted_at: message.inserted_at,
            });
        }
        Ok(delivered)
    }

    async fn delete_message(&self, queue: &str, handle: &MessageHandle) -> RemoteResult<()> {
        self.faults.check("delete_message")?;

        let mut queues = self.queues.write();
        let q = queues
            .get_mut(queue)
            .ok_or_else(|| RemoteError::queue_not_found(queue))?;

        let seq = match q.find_mut(handle) {
            Some((seq, message)) if message.receipt.as_deref() == Some(handle.receipt.as_str()) => seq,
            _ => return Err(Self::stale_receipt(queue, handle)),
        };
        q.messages.remove(&seq);
        Ok(())
    }

    async fn update_visibility(
        &self,
        queue: &str,
        handle: &MessageHandle,
        timeout: Duration,
    ) -> RemoteResult<MessageHandle> {
        self.faults.check("update_visibility")?;

        let now = self.clock.now();
        let mut queues = self.queues.write();
        let q = queues
            .get_mut(queue)
            .ok_or_else(|| RemoteError::queue_not_found(queue))?;

        match q.find_mut(handle) {
            Some((_, message)) if message.receipt.as_deref() == Some(handle.receipt.as_str()) => {
                let receipt = Uuid::new_v4().to_string();
                message.visible_at = now + Self::to_chrono(timeout);
                message.receipt = Some(receipt.clone());
                Ok(MessageHandle {
                    message_id: message.id.clone(),
                    receipt,
                })
            }
            _ => Err(Self::stale_receipt(queue, handle)),
        }
    }

    async fn clear(&self, queue: &str) -> RemoteResult<()> {
        self.faults.check("clear")?;

        let mut queues = self.queues.write();
        let q = queues
            .get_mut(queue)
            .ok_or_else(|| RemoteError::queue_not_found(queue))?;
        q.messages.clear();
        Ok(())
    }

    async fn approximate_count(&self, queue: &str) -> RemoteResult<usize> {
        self.faults.check("approximate_count")?;

        self.queues
            .read()
            .get(queue)
            .map(|q| q.messages.len())
            .ok_or_else(|| RemoteError::queue_not_found(queue))
    }

    async fn peek_oldest(&self, queue: &str) -> RemoteResult<Option<DateTime<Utc>>> {
        self.faults.check("peek_oldest")?;

        let now = self.clock.now();
        let queues = self.queues.read();
        let q = queues
            .get(queue)
            .ok_or_else(|| RemoteError::queue_not_found(queue))?;
        Ok(q
            .messages
            .values()
            .filter(|message| message.visible_at <= now)
            .map(|message| message.inserted_at)
            .min())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_core::ManualClock;

    fn backend() -> (ManualClock, MemoryQueueBackend) {
        let clock = ManualClock::starting_now();
        let backend = MemoryQueueBackend::new().with_clock(Arc::new(clock.clone()));
        (clock, backend)
    }

    #[tokio::test]
    async fn delivered_messages_are_hidden_until_the_timeout() {
        let (clock, backend) = backend();
        backend.create_queue("q").await.unwrap();
        backend.put_message("q", Bytes::from_static(b"a")).await.unwrap();

        let first = backend.get_messages("q", 10, Duration::from_secs(30)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].dequeue_count, 1);
        assert!(backend
            .get_messages("q", 10, Duration::from_secs(30))
            .await
            .unwrap()
            .is_empty());

        clock.advance(chrono::Duration::seconds(31));
        let again = backend.get_messages("q", 10, Duration::from_secs(30)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].dequeue_count, 2);
        assert_eq!(again[0].handle.message_id, first[0].handle.message_id);
        assert_ne!(again[0].handle.receipt, first[0].handle.receipt);
    }

    #[tokio::test]
    async fn only_the_latest_receipt_deletes() {
        let (clock, backend) = backend();
        backend.create_queue("q").await.unwrap();
        backend.put_message("q", Bytes::from_static(b"a")).await.unwrap();

        let stale = backend.get_messages("q", 1, Duration::from_secs(1)).await.unwrap();
        clock.advance(chrono::Duration::seconds(2));
        let fresh = backend.get_messages("q", 1, Duration::from_secs(1)).await.unwrap();

        let err = backend.delete_message("q", &stale[0].handle).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::MessageNotFound);
        backend.delete_message("q", &fresh[0].handle).await.unwrap();
        assert_eq!(backend.message_count("q"), 0);
    }

    #[tokio::test]
    async fn zero_visibility_returns_the_message_immediately() {
        let (_, backend) = backend();
        backend.create_queue("q").await.unwrap();
        backend.put_message("q", Bytes::from_static(b"a")).await.unwrap();

        let delivered = backend.get_messages("q", 1, Duration::from_secs(60)).await.unwrap();
        backend
            .update_visibility("q", &delivered[0].handle, Duration::ZERO)
            .await
            .unwrap();

        let again = backend.get_messages("q", 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].dequeue_count, 2);
    }

    #[tokio::test]
    async fn missing_queue_and_oversized_messages_are_reported() {
        let (_, backend) = backend();
        let err = backend.put_message("nope", Bytes::new()).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::QueueNotFound);

        let backend = backend.with_max_message_bytes(4);
        backend.create_queue("q").await.unwrap();
        let err = backend
            .put_message("q", Bytes::from_static(b"12345"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::RequestTooLarge);
    }

    #[tokio::test]
    async fn oldest_visible_message_is_peeked() {
        let (clock, backend) = backend();
        backend.create_queue("q").await.unwrap();
        let start = clock.now();
        backend.put_message("q", Bytes::from_static(b"a")).await.unwrap();
        clock.advance(chrono::Duration::seconds(5));
        backend.put_message("q", Bytes::from_static(b"b")).await.unwrap();

        assert_eq!(backend.peek_oldest("q").await.unwrap(), Some(start));
        backend.get_messages("q", 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(
            backend.peek_oldest("q").await.unwrap(),
            Some(start + chrono::Duration::seconds(5))
        );
    }
}
