use bytes::{BufMut, Bytes, BytesMut};
use cirrus_core::DataSerializer;
use serde::{Deserialize, Serialize};

use crate::{QueueError, QueueResult};

const INLINE_TAG: u8 = 0x00;
const OVERFLOW_TAG: u8 = 0x01;

/// Bytes added to every payload by the envelope.
pub const ENVELOPE_OVERHEAD: usize = 1;

/// Identity of an application value in the checkout table: the serializer's
/// encoding of the value. Equal values share one key, so the serializer must
/// be deterministic for values handed back to `delete`/`abandon`/`persist`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey(Bytes);

impl MessageKey {
    pub fn from_payload(payload: Bytes) -> Self {
        Self(payload)
    }

    pub fn of<T, S>(serializer: &S, value: &T) -> QueueResult<Self>
    where
        T: Serialize + ?Sized,
        S: DataSerializer,
    {
        Ok(Self(Bytes::from(serializer.serialize(value)?)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }
}

/// Queued stand-in for a payload stored in the overflow container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageWrapper {
    pub container_name: String,
    pub blob_name: String,
}

/// Decoded raw queue payload.
///
/// Wire format: one tag byte, then either the serialized value (`0x00`) or a
/// JSON-encoded [`MessageWrapper`] (`0x01`).
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Inline(Bytes),
    Overflow(MessageWrapper),
}

impl Envelope {
    pub fn encode_inline(payload: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(ENVELOPE_OVERHEAD + payload.len());
        out.put_u8(INLINE_TAG);
        out.put_slice(payload);
        out.freeze()
    }

    pub fn encode_overflow(wrapper: &MessageWrapper) -> QueueResult<Bytes> {
        let record = serde_json::to_vec(wrapper)?;
        let mut out = BytesMut::with_capacity(ENVELOPE_OVERHEAD + record.len());
        out.put_u8(OVERFLOW_TAG);
        out.put_slice(&record);
        Ok(out.freeze())
    }

    pub fn decode(raw: &Bytes) -> QueueResult<Self> {
        match raw.first() {
            Some(&INLINE_TAG) => Ok(Self::Inline(raw.slice(ENVELOPE_OVERHEAD..))),
            Some(&OVERFLOW_TAG) => {
                let wrapper = serde_json::from_slice(&raw[ENVELOPE_OVERHEAD..])?;
                Ok(Self::Overflow(wrapper))
            }
            Some(tag) => Err(QueueError::corrupt(format!("unknown envelope tag 0x{:02x}", tag))),
            None => Err(QueueError::corrupt("empty message")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cirrus_core::JsonSerializer;
    use proptest::prelude::*;

    #[test]
    fn overflow_envelope_round_trips() {
        let wrapper = MessageWrapper {
            container_name: "cirrus-overflowing-messages".into(),
            blob_name: "orders/01HZX".into(),
        };
        let raw = Envelope::encode_overflow(&wrapper).unwrap();
        assert_eq!(raw[0], OVERFLOW_TAG);
        assert_eq!(Envelope::decode(&raw).unwrap(), Envelope::Overflow(wrapper));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            Envelope::decode(&Bytes::new()),
            Err(QueueError::CorruptMessage(_))
        ));
        assert!(matches!(
            Envelope::decode(&Bytes::from_static(&[0x7f, 1, 2])),
            Err(QueueError::CorruptMessage(_))
        ));
        assert!(Envelope::decode(&Bytes::from_static(&[OVERFLOW_TAG, b'{'])).is_err());
    }

    #[test]
    fn equal_values_share_a_key() {
        let a = MessageKey::of(&JsonSerializer, "hello").unwrap();
        let b = MessageKey::of(&JsonSerializer, &"hello".to_string()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, MessageKey::of(&JsonSerializer, "world").unwrap());
    }

    proptest! {
        #[test]
        fn inline_payload_survives_the_envelope(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let raw = Envelope::encode_inline(&payload);
            prop_assert_eq!(raw.len(), payload.len() + ENVELOPE_OVERHEAD);
            match Envelope::decode(&raw).unwrap() {
                Envelope::Inline(decoded) => prop_assert_eq!(&decoded[..], &payload[..]),
                other => prop_assert!(false, "unexpected envelope {:?}", other),
            }
        }
    }
}
