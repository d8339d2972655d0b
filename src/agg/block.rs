//! One 4 MiB aggregate write block: a metadata prefix plus a data area that
//! fragments are appended to as they arrive (spec §3 "Aggregate write
//! block", §4.5; original `agg_write_block.h`).
//!
//! While a block is being filled it lives entirely in memory (`in_memory`
//! on every [`RangeElem`] it produces is `true`), so a read for data still
//! sitting in the current block is served straight out of [`Self::data`]
//! rather than round-tripping through the AIO service (spec §4.8 "Reads
//! against data not yet flushed").

use crate::agg::entry::AggMetaEntry;
use crate::agg::meta::AggWriteMeta;
use crate::checksum::{FragmentHeader, FRAGMENT_HEADER_LEN};
use crate::key::CacheKey;
use crate::range::{RangeElem, MAX_RNG_SIZE};
use crate::units::{round_to_volume_block, AGG_DATA_SIZE, AGG_META_SIZE, VOLUME_BLOCK_SIZE};

#[derive(Debug)]
pub struct AggWriteBlock {
    meta: AggWriteMeta,
    data: Vec<u8>,
    /// Disk-block-aligned offset, in bytes from the start of the data area,
    /// where this block's metadata prefix will start once flushed. The
    /// block's own data area therefore starts at `base_offset +
    /// AGG_META_SIZE` (spec §3's aggregate block layout: prefix then data).
    base_offset: u64,
}

/// Returned by [`AggWriteBlock::add_fragment`] when the block has no more
/// room for the fragment, so the caller should flush the current block and
/// start a new one with the same fragment.
pub struct BlockFull;

impl AggWriteBlock {
    pub fn new(base_offset: u64) -> Self {
        Self { meta: AggWriteMeta::new(), data: Vec::new(), base_offset }
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    fn remaining_data_bytes(&self) -> u64 {
        AGG_DATA_SIZE - self.data.len() as u64
    }

    /// Appends one fragment (already trimmed to at most [`MAX_RNG_SIZE`] by
    /// the caller — splitting larger ranges across fragments is the write
    /// handle's job, spec §4.8) to this block.
    ///
    /// Returns the [`RangeElem`] describing where the fragment now lives, or
    /// `Err(BlockFull)` if the block doesn't have room for it (in either the
    /// metadata prefix or the data area).
    pub fn add_fragment(
        &mut self,
        key: CacheKey,
        rng_offset: u64,
        data: &[u8],
    ) -> Result<RangeElem, BlockFull> {
        assert!(data.len() <= MAX_RNG_SIZE as usize);
        // Every fragment starts on a `VOLUME_BLOCK_SIZE` boundary within the
        // block's data area, so its `disk_offset_blocks` round-trips exactly
        // (no fractional-block truncation) and the AIO disk read it drives
        // later is itself block-aligned (spec §3's "raw I/O unit").
        let aligned_start = round_to_volume_block(self.data.len() as u64);
        let padding = aligned_start - self.data.len() as u64;
        let needed = padding + FRAGMENT_HEADER_LEN as u64 + data.len() as u64;
        if needed > self.remaining_data_bytes() {
            return Err(BlockFull);
        }

        let disk_offset_bytes = self.base_offset + AGG_META_SIZE + aligned_start;
        let header = FragmentHeader::compute(key.as_bytes(), rng_offset, data.len() as u32, disk_offset_bytes);

        let elem = RangeElem::new(rng_offset, data.len() as u32, disk_offset_bytes / VOLUME_BLOCK_SIZE, true);
        let entry = AggMetaEntry::for_elem(key, &elem);
        if !self.meta.fits(&entry) {
            return Err(BlockFull);
        }

        self.data.resize(aligned_start as usize, 0);
        self.data.extend_from_slice(&header.to_bytes());
        self.data.extend_from_slice(data);
        self.meta.push(entry);
        Ok(elem)
    }

    /// Reads back a fragment still held in memory, verifying its checksum.
    pub fn read_fragment(&self, elem: &RangeElem, key: &CacheKey) -> Option<Vec<u8>> {
        let start = (elem.disk_offset_bytes()).checked_sub(self.base_offset + AGG_META_SIZE)? as usize;
        let header_end = start + FRAGMENT_HEADER_LEN;
        let data_end = header_end + elem.rng_size() as usize;
        if data_end > self.data.len() {
            return None;
        }
        let mut header_bytes = [0u8; FRAGMENT_HEADER_LEN];
        header_bytes.copy_from_slice(&self.data[start..header_end]);
        let stored = FragmentHeader::from_bytes(header_bytes);
        let expected = FragmentHeader::compute(
            key.as_bytes(),
            elem.rng_offset(),
            elem.rng_size(),
            elem.disk_offset_bytes(),
        );
        if stored != expected {
            return None;
        }
        Some(self.data[header_end..data_end].to_vec())
    }

    /// Packs the block into its on-disk wire form: meta prefix followed by
    /// the data area, zero-padded to [`AGG_DATA_SIZE`].
    pub fn into_disk_bytes(self) -> Vec<u8> {
        let mut out = self.meta.to_block_bytes();
        out.extend_from_slice(&self.data);
        out.resize(out.len() + (AGG_DATA_SIZE as usize - self.data.len()), 0);
        out
    }

    pub fn meta_entries(&self) -> impl Iterator<Item = &AggMetaEntry> {
        self.meta.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_round_trips_while_in_memory() {
        let mut block = AggWriteBlock::new(0);
        let key = CacheKey::fingerprint(b"k");
        let elem = block.add_fragment(key, 0, b"hello world").unwrap();
        assert!(elem.in_memory());
        let back = block.read_fragment(&elem, &key).unwrap();
        assert_eq!(back, b"hello world");
    }

    #[test]
    fn rejects_fragment_once_data_area_exhausted() {
        let mut block = AggWriteBlock::new(0);
        let key = CacheKey::fingerprint(b"k");
        let chunk = vec![0xAAu8; MAX_RNG_SIZE as usize];
        let mut offset = 0u64;
        loop {
            match block.add_fragment(key, offset, &chunk) {
                Ok(_) => offset += chunk.len() as u64,
                Err(BlockFull) => break,
            }
        }
        assert!(offset > 0);
    }
}
