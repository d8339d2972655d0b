//! One fragment's entry in an aggregate block's metadata prefix (spec §3;
//! original `agg_meta_entry.h`).

use crate::key::CacheKey;
use crate::range::{Range, RangeElem};

#[derive(Debug, Clone)]
pub struct AggMetaEntry {
    pub key: CacheKey,
    pub rng_offset: u64,
    pub rng_size: u32,
}

pub const ENCODED_LEN: usize = 16 + 8 + 4;

impl AggMetaEntry {
    pub fn for_elem(key: CacheKey, elem: &RangeElem) -> Self {
        Self { key, rng_offset: elem.rng_offset(), rng_size: elem.rng_size() }
    }

    pub fn range(&self) -> Range {
        Range::new(self.rng_offset, self.rng_size as u64)
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.key.as_bytes());
        out.extend_from_slice(&self.rng_offset.to_le_bytes());
        out.extend_from_slice(&self.rng_size.to_le_bytes());
    }

    pub fn read_from(buf: &[u8]) -> Option<Self> {
        if buf.len() < ENCODED_LEN {
            return None;
        }
        let mut key_bytes = [0u8; 16];
        key_bytes.copy_from_slice(&buf[0..16]);
        let rng_offset = u64::from_le_bytes(buf[16..24].try_into().ok()?);
        let rng_size = u32::from_le_bytes(buf[24..28].try_into().ok()?);
        Some(Self { key: CacheKey::from_raw(key_bytes), rng_offset, rng_size })
    }
}
