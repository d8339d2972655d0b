//! Error kinds exposed to callers of the cache (spec §6, §7).
//!
//! Mirrors the teacher's layered `snafu` style (see
//! `vector_buffers::variants::disk_v2::ledger::LedgerLoadCreateError`): one
//! `#[derive(Snafu)]` enum per concern, with `#[snafu(display(...))]` messages and
//! `source` fields wrapping the underlying `io::Error` where one exists.

use std::io;

use snafu::Snafu;

/// Errors returned from cache operations.
///
/// `success`/`eof` from spec §6 are not represented here: success is `Ok(_)`, and
/// end-of-stream is signalled by a read handle returning `Ok(None)` rather than an
/// error (see [`crate::handles::read::ReadHandle::read`]).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CacheError {
    /// No range in the table covers (any part of) the requested object range.
    #[snafu(display("object not present"))]
    ObjectNotPresent,

    /// A write was requested for a key/range that is already fully covered.
    #[snafu(display("object already present"))]
    ObjectPresent,

    /// A truncating write (or an exclusive reservation) was requested but the
    /// key's existing ranges still have live readers.
    #[snafu(display("object in use by a reader"))]
    ObjectInUse,

    /// The byte range granted to a write, after trimming overlaps with data
    /// already present, fell below `min_obj_size`.
    #[snafu(display("new object range too small after trimming: {size} bytes"))]
    NewObjectTooSmall { size: u64 },

    /// More bytes were written to a write handle than the transaction reserved.
    #[snafu(display("unexpected data past the end of the reserved range"))]
    UnexpectedData,

    /// The on-disk `fs_metadata` header/footer pair failed to validate.
    #[snafu(display("corrupted object metadata: {reason}"))]
    CorruptedObjectMeta { reason: String },

    /// A fragment's Adler-32 header checksum did not match its (key, range).
    #[snafu(display("corrupted object data: fragment checksum mismatch"))]
    CorruptedObjectData,

    /// The underlying volume returned an I/O error.
    #[snafu(display("disk error: {source}"))]
    DiskError { source: io::Error },

    /// The operation was cancelled (handle closed, or the task was unlinked
    /// from its queue before it ran).
    #[snafu(display("operation aborted"))]
    OperationAborted,

    /// A handle method was called after the handle had already completed or
    /// been closed.
    #[snafu(display("invalid handle state"))]
    InvalidHandle,

    /// The owning AIO service was stopped while the task was outstanding.
    #[snafu(display("service stopped"))]
    ServiceStopped,

    /// A precondition internal to the cache was violated; this indicates a bug
    /// rather than a caller or disk fault.
    #[snafu(display("internal logic error: {reason}"))]
    InternalLogicError { reason: String },

    /// The volume's `fs_table` has no room for another entry. Non-goals
    /// (spec §1) exclude fine-grained eviction, so this surfaces directly
    /// to the caller rather than triggering a reclaim pass.
    #[snafu(display("volume metadata table is full"))]
    StorageExhausted,
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

impl From<io::Error> for CacheError {
    fn from(source: io::Error) -> Self {
        CacheError::DiskError { source }
    }
}
