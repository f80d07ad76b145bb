use cirrus_core::{ConfigSnapshot, RetryPolicies};

/// Configuration for the queue adapter
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Largest raw queue message (envelope included) sent inline. Anything
    /// bigger goes to the overflow container.
    pub max_message_bytes: usize,
    /// Persisted store receiving messages dequeued too many times
    pub poison_store: String,
    /// Blob container holding oversized payloads
    pub overflow_container: String,
    /// Blob container holding persisted messages
    pub persisted_container: String,
    pub retry: RetryPolicies,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: 6 * 1024,
            poison_store: "failing-messages".to_string(),
            overflow_container: "cirrus-overflowing-messages".to_string(),
            persisted_container: "cirrus-persisted-messages".to_string(),
            retry: RetryPolicies::default(),
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `queue.*` and `retry.*` keys, keeping defaults for missing ones.
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            max_message_bytes: snapshot
                .get_usize("queue.max_message_bytes")
                .unwrap_or(defaults.max_message_bytes),
            poison_store: snapshot
                .get_string("queue.poison_store")
                .unwrap_or(defaults.poison_store),
            overflow_container: snapshot
                .get_string("queue.overflow_container")
                .unwrap_or(defaults.overflow_container),
            persisted_container: snapshot
                .get_string("queue.persisted_container")
                .unwrap_or(defaults.persisted_container),
            retry: RetryPolicies::from_snapshot(snapshot),
        }
    }

    pub fn with_max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = bytes;
        self
    }

    pub fn with_poison_store<S: Into<String>>(mut self, store: S) -> Self {
        self.poison_store = store.into();
        self
    }

    pub fn with_overflow_container<S: Into<String>>(mut self, container: S) -> Self {
        self.overflow_container = container.into();
        self
    }

    pub fn with_persisted_container<S: Into<String>>(mut self, container: S) -> Self {
        self.persisted_container = container.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicies) -> Self {
        self.retry = retry;
        self
    }
}
