use cirrus_core::{ConfigSnapshot, RetryPolicies};

/// Configuration for the table adapter
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Operations per batch request
    pub max_batch_entities: usize,
    /// Payload per batch request. Kept below the 4MiB service limit to leave
    /// room for the request envelope.
    pub max_batch_payload_bytes: usize,
    pub retry: RetryPolicies,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            max_batch_entities: 100,
            max_batch_payload_bytes: 4 * 1024 * 1024 - 128 * 1024,
            retry: RetryPolicies::default(),
        }
    }
}

impl TableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `table.*` and `retry.*` keys, keeping defaults for missing ones.
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            max_batch_entities: snapshot
                .get_usize("table.max_batch_entities")
                .unwrap_or(defaults.max_batch_entities),
            max_batch_payload_bytes: snapshot
                .get_usize("table.max_batch_payload_bytes")
                .unwrap_or(defaults.max_batch_payload_bytes),
            retry: RetryPolicies::from_snapshot(snapshot),
        }
    }

    pub fn with_max_batch_entities(mut self, count: usize) -> Self {
        self.max_batch_entities = count.max(1);
        self
    }

    pub fn with_max_batch_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_payload_bytes = bytes;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicies) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_core::StorageConfig;

    #[test]
    fn snapshot_overrides_batch_limits() {
        let mut storage = StorageConfig::new();
        storage.set("table.max_batch_entities", "10");

        let config = TableConfig::from_snapshot(&storage.snapshot());
        assert_eq!(config.max_batch_entities, 10);
        assert_eq!(config.max_batch_payload_bytes, 4 * 1024 * 1024 - 128 * 1024);
    }
}
