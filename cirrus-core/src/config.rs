//! # Configuration
//!
//! A minimal string key/value store, layered however the application likes.
//! Providers read typed settings from an immutable [`ConfigSnapshot`]
//! (`QueueConfig::from_snapshot`, `TableConfig::from_snapshot`,
//! `RetryPolicies::from_snapshot`, ...), falling back to defaults for
//! missing keys.
//!
//! ```rust
//! use cirrus_core::StorageConfig;
//!
//! let mut config = StorageConfig::new();
//! config.set("queue.max_message_bytes", "6144");
//! assert_eq!(config.snapshot().get_usize("queue.max_message_bytes"), Some(6144));
//! ```
//!
//! ## Environment overrides
//! [`StorageConfig::load_env`] maps `PREFIX__QUEUE__MAX_MESSAGE_BYTES` to
//! `queue.max_message_bytes`.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct StorageConfig {
    values: HashMap<String, String>,
}

impl StorageConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Load every `{prefix}__A__B=value` environment variable as `a.b`.
    pub fn load_env(&mut self, prefix: &str) {
        self.load_vars(prefix, std::env::vars());
    }

    fn load_vars<I>(&mut self, prefix: &str, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefix = format!("{}__", prefix);
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(&prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
            }
        }
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    map: HashMap<String, String>,
}

impl ConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.map.get(key).cloned()
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse::<bool>().ok())
    }
}
