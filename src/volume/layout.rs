//! Static disk layout of one volume (spec §3 "On-disk layout", §6).
//!
//! Original `fs_metadata.cpp` lays a volume out as:
//! `[skip region][metadata copy A][metadata copy B][circular data area]`,
//! and sizes the metadata copies by successive approximation: start from a
//! guess at the average object size, compute how many `fs_table` entries
//! that implies for the data area, size the table (and thus the metadata
//! region) to hold that many entries plus slack, then re-derive the data
//! area size from whatever space is left and repeat until the guess
//! converges. [`VolumeLayout::compute`] reproduces that loop.

use crate::units::{round_to_store_block, STORE_BLOCK_SIZE, VOLUME_BLOCK_SIZE};

/// Bytes reserved at the start of the volume and never written by the cache
/// (room for a disk label/partition boot sector, matching the original's
/// `SKIP_BYTES`).
pub const SKIP_BYTES: u64 = 4096;

/// Bytes a single `fs_table` entry occupies once serialized (fingerprint +
/// one inline [`crate::range::RangeElem`], the common case — heap-overflowed
/// entries are handled by the table's own growth, not accounted for here;
/// this is a sizing estimate, not a hard cap).
const APPROX_ENTRY_SIZE: u64 = 16 + crate::range::RangeElem::ENCODED_LEN as u64;

/// Fixed overhead of one metadata copy's header + footer (spec §3 "A/B
/// metadata durability").
const METADATA_FIXED_OVERHEAD: u64 = STORE_BLOCK_SIZE * 2;

#[derive(Debug, Clone, Copy)]
pub struct VolumeLayout {
    pub total_bytes: u64,
    pub skip_bytes: u64,
    pub metadata_copy_bytes: u64,
    pub metadata_a_offset: u64,
    pub metadata_b_offset: u64,
    pub data_area_offset: u64,
    pub data_area_bytes: u64,
    pub table_capacity_entries: u64,
}

impl VolumeLayout {
    /// Derives the layout for a volume of `total_bytes`, sized around
    /// `avg_obj_size_bytes` (spec §6 `cache_min_avg_object_size_KB`, taken
    /// here in bytes already validated by [`crate::config`]).
    pub fn compute(total_bytes: u64, avg_obj_size_bytes: u64) -> Self {
        assert!(total_bytes > SKIP_BYTES, "volume too small");
        assert!(avg_obj_size_bytes > 0);

        let usable = total_bytes - SKIP_BYTES;
        // Seed the loop assuming the whole usable area is data; each
        // iteration re-estimates the table size from the previous
        // iteration's data area and converges in a handful of steps because
        // metadata overhead is small relative to data (same behavior as the
        // original's fixed-point loop over `avail_disk_space`).
        let mut data_area_bytes = usable;
        let mut metadata_copy_bytes;
        loop {
            let est_entries = data_area_bytes / avg_obj_size_bytes.max(1);
            let table_bytes = round_to_store_block(est_entries * APPROX_ENTRY_SIZE);
            metadata_copy_bytes = round_to_store_block(table_bytes + METADATA_FIXED_OVERHEAD);
            let next_data_area = usable.saturating_sub(metadata_copy_bytes * 2);
            if next_data_area == data_area_bytes || next_data_area == 0 {
                data_area_bytes = next_data_area;
                break;
            }
            data_area_bytes = next_data_area;
        }

        let table_capacity_entries = {
            let table_bytes = metadata_copy_bytes.saturating_sub(METADATA_FIXED_OVERHEAD);
            table_bytes / APPROX_ENTRY_SIZE
        };

        let metadata_a_offset = SKIP_BYTES;
        let metadata_b_offset = metadata_a_offset + metadata_copy_bytes;
        let data_area_offset = metadata_b_offset + metadata_copy_bytes;
        let data_area_bytes = total_bytes - data_area_offset;

        let layout = Self {
            total_bytes,
            skip_bytes: SKIP_BYTES,
            metadata_copy_bytes,
            metadata_a_offset,
            metadata_b_offset,
            data_area_offset,
            data_area_bytes: data_area_bytes - (data_area_bytes % VOLUME_BLOCK_SIZE),
            table_capacity_entries,
        };
        assert!(layout.data_area_bytes > 0, "volume too small to hold any data");
        layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_fits_within_volume() {
        let layout = VolumeLayout::compute(1024 * 1024 * 1024, 64 * 1024);
        assert!(layout.data_area_offset + layout.data_area_bytes <= layout.total_bytes);
        assert!(layout.table_capacity_entries > 0);
    }

    #[test]
    fn smaller_avg_object_size_grows_table() {
        let big_objs = VolumeLayout::compute(1024 * 1024 * 1024, 1024 * 1024);
        let small_objs = VolumeLayout::compute(1024 * 1024 * 1024, 16 * 1024);
        assert!(small_objs.table_capacity_entries > big_objs.table_capacity_entries);
        assert!(small_objs.data_area_bytes < big_objs.data_area_bytes);
    }
}
