use cirrus_core::{ConfigSnapshot, RetryPolicies};

/// Configuration for blob operations
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Absolute max size allowed for a single blob (safety guard)
    pub max_blob_bytes: usize,

    /// Retry policies wrapped around every remote call
    pub retry: RetryPolicies,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: 64 * 1024 * 1024, // 64MB
            retry: RetryPolicies::default(),
        }
    }
}

impl BlobConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `blob.max_blob_bytes` and `retry.*`, keeping defaults for missing keys.
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            max_blob_bytes: snapshot
                .get_usize("blob.max_blob_bytes")
                .unwrap_or(defaults.max_blob_bytes),
            retry: RetryPolicies::from_snapshot(snapshot),
        }
    }

    /// Set max blob size
    pub fn with_max_blob_bytes(mut self, bytes: usize) -> Self {
        self.max_blob_bytes = bytes;
        self
    }

    /// Set retry policies
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
    fn snapshot_overrides_defaults() {
        let mut config = StorageConfig::new();
        config.set("blob.max_blob_bytes", "1024");
        config.set("retry.transient.max_attempts", "2");

        let blob = BlobConfig::from_snapshot(&config.snapshot());
        assert_eq!(blob.max_blob_bytes, 1024);
        assert_eq!(blob.retry.transient.max_attempts, 2);
    }
}
