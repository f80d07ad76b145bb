use chrono::{DateTime, Utc};
use cirrus_core::DataSerializer;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::QueueResult;

/// A message moved out of its queue into a named persisted store, either on
/// request or because it kept failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMessage {
    pub queue_name: String,
    pub inserted_at: DateTime<Utc>,
    pub persisted_at: DateTime<Utc>,
    pub dequeue_count: u32,
    pub reason: String,
    /// Serialized application value, never an overflow wrapper.
    pub payload: Vec<u8>,
}

impl PersistedMessage {
    /// Decode the payload with the serializer it was written with.
    pub fn value<T, S>(&self, serializer: &S) -> QueueResult<T>
    where
        T: DeserializeOwned,
        S: DataSerializer,
    {
        Ok(serializer.deserialize(&self.payload)?)
    }

    pub(crate) fn to_record(&self) -> QueueResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub(crate) fn from_record(record: &[u8]) -> QueueResult<Self> {
        Ok(serde_json::from_slice(record)?)
    }
}

/// A persisted message together with its key inside the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedEntry {
    pub store: String,
    pub key: String,
    pub message: PersistedMessage,
}
