//! Deciding whether an incoming request should be served as a read or a
//! write (spec §4.8 "Open"; original `cache_fs_ops.h`'s `fsmd_begin_read`/
//! `fsmd_begin_write`).
//!
//! Both functions are called with the owning [`crate::metadata::FsMetadata`]
//! already locked by the caller ([`crate::fs::CacheFs`]); they only touch the
//! table, so they take `&FsTable`/`&mut FsTable` directly rather than the
//! whole `FsMetadata`.

use std::sync::Arc;

use crate::error::CacheError;
use crate::key::CacheKey;
use crate::metadata::table::FsTable;
use crate::range::{Range, RangeElem};

/// What [`fsmd_begin_read`]/[`fsmd_begin_write`] decided to do with a
/// request.
pub enum OpenOutcome {
    /// The requested range is already present; hand the caller a read
    /// handle over this element. Its reader count has already been
    /// incremented.
    Read(Arc<RangeElem>),
    /// The requested range (after trimming away anything already present)
    /// should be written under `key`.
    Write { key: CacheKey, reserved: Range },
}

/// Minimum size, after trimming against what's already cached, that a new
/// write is allowed to reserve (spec §4.8 "new object too small").
pub const MIN_NEW_OBJECT_SIZE: u64 = 1024;

/// Looks up `wanted` under `key`. If a live range fully covers it, returns a
/// read handle (incrementing that range's reader count). Otherwise returns
/// [`CacheError::ObjectNotPresent`] — the caller falls through to
/// [`fsmd_begin_write`].
pub fn fsmd_begin_read(table: &FsTable, key: &CacheKey, wanted: Range) -> Result<OpenOutcome, CacheError> {
    let rv = table.get(key).ok_or(CacheError::ObjectNotPresent)?;
    let elem = rv.find_full_range(wanted).ok_or(CacheError::ObjectNotPresent)?;
    if !elem.atomic_inc_readers() {
        return Err(CacheError::InternalLogicError {
            reason: "reader count saturated".to_string(),
        });
    }
    Ok(OpenOutcome::Read(Arc::clone(elem)))
}

/// Reserves `wanted` under `key` for a write, trimming away any part that's
/// already fully covered by a live range. Fails with
/// [`CacheError::ObjectPresent`] if `wanted` is already fully covered, with
/// [`CacheError::ObjectInUse`] if the reservation would overlap a range that
/// still has live readers (a truncating write can't safely invalidate data
/// a reader is mid-read on), and with
/// [`CacheError::NewObjectTooSmall`] if what's left after trimming falls
/// below [`MIN_NEW_OBJECT_SIZE`].
pub fn fsmd_begin_write(
    table: &FsTable,
    key: &CacheKey,
    wanted: Range,
) -> Result<OpenOutcome, CacheError> {
    let trimmed = match table.get(key) {
        None => wanted,
        Some(rv) => {
            if rv.find_full_range(wanted).is_some() {
                return Err(CacheError::ObjectPresent);
            }
            if let Some(overlap) = rv.find_in_range(wanted) {
                if overlap.has_readers() {
                    return Err(CacheError::ObjectInUse);
                }
                trim_against(wanted, overlap.range())
            } else {
                wanted
            }
        }
    };

    if trimmed.size < MIN_NEW_OBJECT_SIZE {
        return Err(CacheError::NewObjectTooSmall { size: trimmed.size });
    }

    Ok(OpenOutcome::Write { key: *key, reserved: trimmed })
}

/// Shrinks `wanted` to the portion not already covered by `existing`,
/// keeping whichever side is larger when `existing` splits `wanted` into two
/// pieces (spec §4.8: prefer serving the larger uncached remainder).
fn trim_against(wanted: Range, existing: Range) -> Range {
    let lead = existing.begin.saturating_sub(wanted.begin);
    let trail = wanted.end().saturating_sub(existing.end());
    if lead >= trail {
        Range::new(wanted.begin, lead)
    } else {
        Range::new(existing.end(), trail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_read_requires_full_coverage() {
        let mut table = FsTable::new();
        let key = CacheKey::fingerprint(b"a");
        table.entry_or_insert(key).add_range(RangeElem::new(0, 4096, 0, true));
        assert!(matches!(
            fsmd_begin_read(&table, &key, Range::new(0, 4096)),
            Ok(OpenOutcome::Read(_))
        ));
        assert!(matches!(
            fsmd_begin_read(&table, &key, Range::new(0, 8192)),
            Err(CacheError::ObjectNotPresent)
        ));
    }

    #[test]
    fn begin_write_rejects_fully_present_range() {
        let mut table = FsTable::new();
        let key = CacheKey::fingerprint(b"a");
        table.entry_or_insert(key).add_range(RangeElem::new(0, 4096, 0, true));
        assert!(matches!(
            fsmd_begin_write(&table, &key, Range::new(0, 4096)),
            Err(CacheError::ObjectPresent)
        ));
    }

    #[test]
    fn begin_write_rejects_in_use_overlap() {
        let mut table = FsTable::new();
        let key = CacheKey::fingerprint(b"a");
        table.entry_or_insert(key).add_range(RangeElem::new(0, 4096, 0, true));
        let elem = table.get(&key).unwrap().find_full_range(Range::new(0, 4096)).unwrap();
        elem.atomic_inc_readers();
        assert!(matches!(
            fsmd_begin_write(&table, &key, Range::new(0, 8192)),
            Err(CacheError::ObjectInUse)
        ));
    }

    #[test]
    fn begin_write_trims_against_existing_coverage() {
        let mut table = FsTable::new();
        let key = CacheKey::fingerprint(b"a");
        table.entry_or_insert(key).add_range(RangeElem::new(0, 4096, 0, true));
        match fsmd_begin_write(&table, &key, Range::new(0, 8192)).unwrap() {
            OpenOutcome::Write { reserved, .. } => {
                assert_eq!(reserved, Range::new(4096, 4096));
            }
            _ => panic!("expected write outcome"),
        }
    }
}
