//! In-memory fingerprint → range-vector index (spec §3 "FS table", §4.4).
//!
//! A plain `HashMap` guarded by the caller's lock (held by
//! [`crate::metadata::fs_metadata::FsMetadata`]), rather than a concurrent
//! map: the teacher reaches for `std::collections::HashMap` behind its own
//! locks in `variants/disk_v2/ledger.rs` rather than pulling in a
//! lock-free map crate, and this table is only mutated from the single
//! aggregate-writer thread per volume (spec §5), so there is no
//! multi-writer case to optimize for.

use std::collections::HashMap;

use crate::key::CacheKey;
use crate::range_vector::RangeVector;

/// Capacity is enforced by the caller against
/// [`crate::volume::layout::VolumeLayout::table_capacity_entries`]; this
/// type itself just holds whatever it's given.
#[derive(Default, Debug)]
pub struct FsTable {
    entries: HashMap<CacheKey, RangeVector>,
}

impl FsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&RangeVector> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &CacheKey) -> Option<&mut RangeVector> {
        self.entries.get_mut(key)
    }

    pub fn entry_or_insert(&mut self, key: CacheKey) -> &mut RangeVector {
        self.entries.entry(key).or_insert_with(RangeVector::new)
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<RangeVector> {
        self.entries.remove(key)
    }

    /// Drops entries whose range vector has become empty (every fragment
    /// evacuated or explicitly removed). Called after each write/evacuation
    /// so the table doesn't accumulate empty tombstones (spec §4.7).
    pub fn prune_empty(&mut self) {
        self.entries.retain(|_, rv| !rv.is_empty());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &RangeVector)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::RangeElem;

    #[test]
    fn prune_empty_drops_emptied_entries() {
        let mut table = FsTable::new();
        let key = CacheKey::fingerprint(b"x");
        table.entry_or_insert(key).add_range(RangeElem::new(0, 4096, 0, true));
        assert_eq!(table.len(), 1);
        table.get_mut(&key).unwrap().rem_range(crate::range::Range::new(0, 4096));
        table.prune_empty();
        assert_eq!(table.len(), 0);
    }
}
