//! Wide-entity sharding.
//!
//! A table property holds at most 64KB, so a serialized value is cut into up
//! to 15 binary columns `P0`..`P14`. Trailing unused columns are absent,
//! never empty.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use crate::{TableError, TableResult};

pub const SLOT_COUNT: usize = 15;
pub const SLOT_BYTES: usize = 64 * 1024;
/// Serialized values must be strictly smaller than this.
pub const MAX_DATA_BYTES: usize = SLOT_COUNT * SLOT_BYTES;

pub type Slots = [Option<Bytes>; SLOT_COUNT];

/// Column name of slot `index`.
pub fn slot_name(index: usize) -> String {
    format!("P{}", index)
}

/// Cut `data` into at most [`SLOT_COUNT`] chunks of at most [`SLOT_BYTES`].
pub fn split(data: &Bytes) -> TableResult<Slots> {
    if data.len() >= MAX_DATA_BYTES {
        return Err(TableError::EntityTooLarge {
            size: data.len(),
            max: MAX_DATA_BYTES - 1,
        });
    }

    let mut slots: Slots = Default::default();
    for (index, start) in (0..data.len()).step_by(SLOT_BYTES).enumerate() {
        let end = (start + SLOT_BYTES).min(data.len());
        slots[index] = Some(data.slice(start..end));
    }
    Ok(slots)
}

/// Concatenate the present slots back into the serialized value.
pub fn join(slots: &Slots) -> TableResult<Bytes> {
    let total: usize = slots.iter().flatten().map(Bytes::len).sum();
    if total >= MAX_DATA_BYTES {
        return Err(TableError::EntityTooLarge {
            size: total,
            max: MAX_DATA_BYTES - 1,
        });
    }

    let mut out = BytesMut::with_capacity(total);
    for slot in slots.iter().flatten() {
        out.extend_from_slice(slot);
    }
    Ok(out.freeze())
}

/// Slots as named binary properties, absent slots omitted.
pub fn to_properties(slots: &Slots) -> BTreeMap<String, Bytes> {
    slots
        .iter()
        .enumerate()
        .filter_map(|(index, slot)| slot.as_ref().map(|bytes| (slot_name(index), bytes.clone())))
        .collect()
}

/// Rebuild slots from a row's properties. Unknown columns are ignored.
pub fn from_properties(properties: &BTreeMap<String, Bytes>) -> TableResult<Slots> {
    let mut slots: Slots = Default::default();
    for (index, slot) in slots.iter_mut().enumerate() {
        if let Some(bytes) = properties.get(&slot_name(index)) {
            if bytes.len() > SLOT_BYTES {
                return Err(TableError::CorruptEntity(format!(
                    "column {} holds {} bytes",
                    slot_name(index),
                    bytes.len()
                )));
            }
            *slot = Some(bytes.clone());
        }
    }
    Ok(slots)
}
