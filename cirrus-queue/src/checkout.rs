//! Process-local bookkeeping of delivered, not yet disposed messages.
//!
//! Callers hand back the application value, not a handle, so every delivery is
//! recorded under the value's [`MessageKey`]. Distinct messages carrying equal
//! values stack up under one key; a redelivery of the same message replaces
//! its earlier (now stale) handle.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::backend::MessageHandle;
use crate::types::{MessageKey, MessageWrapper};

/// One outstanding delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub queue: String,
    pub handle: MessageHandle,
    /// Set when the payload lives in an overflow blob.
    pub overflow: Option<MessageWrapper>,
    pub dequeue_count: u32,
    pub inserted_at: DateTime<Utc>,
}

/// The lock is never held across an `.await`: every method takes it, edits
/// the map and returns owned data.
#[derive(Debug, Default)]
pub struct CheckoutTable {
    entries: Mutex<HashMap<MessageKey, Vec<Delivery>>>,
}

impl CheckoutTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: MessageKey, delivery: Delivery) {
        let mut entries = self.entries.lock();
        let deliveries = entries.entry(key).or_default();
        match deliveries
            .iter_mut()
            .find(|d| d.queue == delivery.queue && d.handle.message_id == delivery.handle.message_id)
        {
            Some(existing) => *existing = delivery,
            None => deliveries.push(delivery),
        }
    }

    /// Remove the most recent delivery recorded for `key`.
    pub fn take(&self, key: &MessageKey) -> Option<Delivery> {
        let mut entries = self.entries.lock();
        let deliveries = entries.get_mut(key)?;
        let delivery = deliveries.pop();
        if deliveries.is_empty() {
            entries.remove(key);
        }
        delivery
    }

    /// Remove the delivery carrying exactly `handle`.
    pub fn take_exact(&self, key: &MessageKey, handle: &MessageHandle) -> Option<Delivery> {
        let mut entries = self.entries.lock();
        let deliveries = entries.get_mut(key)?;
        let index = deliveries.iter().position(|d| d.handle == *handle)?;
        let delivery = deliveries.remove(index);
        if deliveries.is_empty() {
            entries.remove(key);
        }
        Some(delivery)
    }

    /// Copy of the most recent delivery for `key`, left in place.
    pub fn latest(&self, key: &MessageKey) -> Option<Delivery> {
        self.entries
            .lock()
            .get(key)
            .and_then(|deliveries| deliveries.last().cloned())
    }

    /// Swap a handle after its receipt was renewed.
    pub fn replace_handle(&self, key: &MessageKey, old: &MessageHandle, new: MessageHandle) -> bool {
        let mut entries = self.entries.lock();
        let found = entries
            .get_mut(key)
            .and_then(|deliveries| deliveries.iter_mut().find(|d| d.handle == *old));
        match found {
            Some(delivery) => {
                delivery.handle = new;
                true
            }
            None => false,
        }
    }

    /// Remove and return every outstanding delivery.
    pub fn drain(&self) -> Vec<Delivery> {
        self.entries
            .lock()
            .drain()
            .flat_map(|(_, deliveries)| deliveries)
            .collect()
    }

    /// Forget every delivery from `queue`. Returns how many were dropped.
    pub fn forget_queue(&self, queue: &str) -> usize {
        let mut entries = self.entries.lock();
        let mut dropped = 0;
        entries.retain(|_, deliveries| {
            let before = deliveries.len();
            deliveries.retain(|d| d.queue != queue);
            dropped += before - deliveries.len();
            !deliveries.is_empty()
        });
        dropped
    }

    /// Number of distinct values checked out.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of outstanding deliveries across all values.
    pub fn handle_count(&self) -> usize {
        self.entries.lock().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn delivery(queue: &str, id: &str, receipt: &str) -> Delivery {
        Delivery {
            queue: queue.to_string(),
            handle: MessageHandle {
                message_id: id.to_string(),
                receipt: receipt.to_string(),
            },
            overflow: None,
            dequeue_count: 1,
            inserted_at: Utc::now(),
        }
    }

    fn key(s: &'static str) -> MessageKey {
        MessageKey::from_payload(Bytes::from_static(s.as_bytes()))
    }

    #[test]
    fn equal_values_accumulate_handles() {
        let table = CheckoutTable::new();
        table.register(key("a"), delivery("q", "m1", "r1"));
        table.register(key("a"), delivery("q", "m2", "r2"));

        assert_eq!(table.len(), 1);
        assert_eq!(table.handle_count(), 2);

        assert!(table.take(&key("a")).is_some());
        assert_eq!(table.len(), 1);
        assert!(table.take(&key("a")).is_some());
        assert!(table.is_empty());
        assert!(table.take(&key("a")).is_none());
    }

    #[test]
    fn redelivery_replaces_the_stale_handle() {
        let table = CheckoutTable::new();
        table.register(key("a"), delivery("q", "m1", "r1"));
        table.register(key("a"), delivery("q", "m1", "r2"));

        assert_eq!(table.handle_count(), 1);
        assert_eq!(table.latest(&key("a")).unwrap().handle.receipt, "r2");
    }

    #[test]
    fn forgetting_a_queue_keeps_others() {
        let table = CheckoutTable::new();
        table.register(key("a"), delivery("q1", "m1", "r1"));
        table.register(key("a"), delivery("q2", "m2", "r2"));
        table.register(key("b"), delivery("q1", "m3", "r3"));

        assert_eq!(table.forget_queue("q1"), 2);
        assert_eq!(table.handle_count(), 1);
        assert_eq!(table.drain().len(), 1);
        assert!(table.is_empty());
    }
}
