use std::time::Duration;

use cirrus_core::ConfigSnapshot;

/// Configuration for the lease coordinator
#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// Blob container holding one state record per job
    pub container: String,
    /// Added to the execution timeout to get the lease timeout
    pub safety_margin: Duration,
    /// How many times `release` re-reads after losing a write race
    pub release_attempts: u32,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            container: "cirrus-scheduled-jobs".to_string(),
            safety_margin: Duration::from_secs(2 * 60),
            release_attempts: 5,
        }
    }
}

impl LeaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `lease.*` keys, keeping defaults for missing ones.
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let defaults = Self::default();
        Self {
            container: snapshot
                .get_string("lease.container")
                .unwrap_or(defaults.container),
            safety_margin: snapshot
                .get_u64("lease.safety_margin_secs")
                .map(Duration::from_secs)
                .unwrap_or(defaults.safety_margin),
            release_attempts: snapshot
                .get_u64("lease.release_attempts")
                .map(|n| n.max(1) as u32)
                .unwrap_or(defaults.release_attempts),
        }
    }

    pub fn with_container<S: Into<String>>(mut self, container: S) -> Self {
        self.container = container.into();
        self
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.safety_margin = margin;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_core::StorageConfig;

    #[test]
    fn safety_margin_is_read_in_seconds() {
        let mut storage = StorageConfig::new();
        storage.set("lease.safety_margin_secs", "30");

        let config = LeaseConfig::from_snapshot(&storage.snapshot());
        assert_eq!(config.safety_margin, Duration::from_secs(30));
        assert_eq!(config.container, "cirrus-scheduled-jobs");
    }
}
