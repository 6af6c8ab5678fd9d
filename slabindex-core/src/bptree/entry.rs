use std::mem;

use crate::medium::codec::{self, Decoder, Encoder};

/// The 64-bit key of a record, computed by the caller (typically a hash of the record's key).
pub type Key = u64;

/// Where the bytes of a record live: a storage segment and a slot inside it.
///
/// Opaque to the index, meaningful only to the storage engine's segment layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Locator {
    pub segment_id: u64,
    pub slot_index: u64,
}

impl Locator {
    #[inline]
    pub const fn new(segment_id: u64, slot_index: u64) -> Self {
        Self {
            segment_id,
            slot_index,
        }
    }
}

/// A key and the locator it maps to, as stored in a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entry {
    pub key: Key,
    pub locator: Locator,
}

impl Entry {
    /// The encoded size of an entry.
    pub(crate) const SIZE: usize = 3 * mem::size_of::<u64>();

    #[inline]
    pub const fn new(key: Key, locator: Locator) -> Self {
        Self { key, locator }
    }

    #[inline]
    pub(crate) fn decode(decoder: &mut Decoder<'_>) -> codec::Result<Self> {
        let key = decoder.u64()?;
        let locator = Locator::new(decoder.u64()?, decoder.u64()?);
        Ok(Self { key, locator })
    }

    #[inline]
    pub(crate) fn encode(&self, encoder: &mut Encoder<'_>) -> codec::Result<()> {
        encoder.put_u64(self.key)?;
        encoder.put_u64(self.locator.segment_id)?;
        encoder.put_u64(self.locator.slot_index)
    }
}

impl From<(Key, Locator)> for Entry {
    #[inline]
    fn from((key, locator): (Key, Locator)) -> Self {
        Self { key, locator }
    }
}
