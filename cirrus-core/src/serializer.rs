//! Pluggable payload serializers.
//!
//! Providers never look inside payloads; they hand values to a
//! [`DataSerializer`] and store the resulting bytes. The queue provider also
//! uses the encoded bytes as the identity of a checked-out message, so an
//! implementation must be deterministic: serializing equal values twice has to
//! yield identical bytes. `serde_json` and `rmp-serde` are, as long as the
//! value types avoid hash-ordered maps.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[cfg(feature = "msgpack")]
    #[error("MessagePack encode error: {source}")]
    MsgPackEncode {
        #[from]
        source: rmp_serde::encode::Error,
    },

    #[cfg(feature = "msgpack")]
    #[error("MessagePack decode error: {source}")]
    MsgPackDecode {
        #[from]
        source: rmp_serde::decode::Error,
    },
}

/// Turns values into bytes and back.
pub trait DataSerializer: Send + Sync + Clone + 'static {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError>;

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError>;

    /// Short identifier, useful in logs.
    fn format_id(&self) -> &'static str;
}

/// JSON serializer, the default for every provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl DataSerializer for JsonSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn format_id(&self) -> &'static str {
        "json"
    }
}

/// Compact MessagePack serializer (struct fields encoded by name).
#[cfg(feature = "msgpack")]
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackSerializer;

#[cfg(feature = "msgpack")]
impl DataSerializer for MsgPackSerializer {
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, SerializationError> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerializationError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    fn format_id(&self) -> &'static str {
        "msgpack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Invoice {
        id: u32,
        customer: String,
        lines: Vec<u64>,
    }

    fn invoice() -> Invoice {
        Invoice {
            id: 42,
            customer: "acme".to_string(),
            lines: vec![10, 20, 30],
        }
    }

    #[test]
    fn json_roundtrip() {
        let serializer = JsonSerializer;
        let bytes = serializer.serialize(&invoice()).unwrap();
        let decoded: Invoice = serializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, invoice());
        assert_eq!(serializer.format_id(), "json");
    }

    #[test]
    fn json_is_deterministic_for_equal_values() {
        let serializer = JsonSerializer;
        let a = serializer.serialize(&invoice()).unwrap();
        let b = serializer.serialize(&invoice().clone()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn json_reports_garbage() {
        let serializer = JsonSerializer;
        let result: Result<Invoice, _> = serializer.deserialize(b"not json");
        assert!(matches!(result, Err(SerializationError::Json { .. })));
    }

    #[cfg(feature = "msgpack")]
    #[test]
    fn msgpack_roundtrip() {
        let serializer = MsgPackSerializer;
        let bytes = serializer.serialize(&invoice()).unwrap();
        let decoded: Invoice = serializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, invoice());
    }
}
