//! The façade a volume's handles are opened through (spec §3 "cache_fs_ops",
//! component C8): ties [`crate::handles::open`]'s decision to the concrete
//! [`crate::handles::read::ReadHandle`]/[`crate::handles::write::WriteHandle`]
//! built from this volume's live state.

use std::sync::{Arc, Mutex};

use crate::agg::writer::AggWriter;
use crate::aio::queue::AioTaskQueue;
use crate::error::CacheError;
use crate::handles::open::{fsmd_begin_read, fsmd_begin_write, OpenOutcome};
use crate::handles::{ReadHandle, WriteHandle};
use crate::key::CacheKey;
use crate::metadata::FsMetadata;
use crate::range::Range;
use crate::volume::VolumeLayout;

#[derive(Clone)]
pub struct CacheFsOps {
    metadata: Arc<Mutex<FsMetadata>>,
    writer: Arc<Mutex<AggWriter>>,
    queue: Arc<AioTaskQueue>,
    layout: VolumeLayout,
}

/// Either side of an open request (spec §4.8 "Open" decides which).
#[derive(Debug)]
pub enum Handle {
    Read(ReadHandle),
    Write(WriteHandle),
}

impl CacheFsOps {
    pub fn new(
        metadata: Arc<Mutex<FsMetadata>>,
        writer: Arc<Mutex<AggWriter>>,
        queue: Arc<AioTaskQueue>,
        layout: VolumeLayout,
    ) -> Self {
        Self { metadata, writer, queue, layout }
    }

    /// Opens `key`'s `wanted` byte range, returning a read handle if it's
    /// already present, or a write handle reserving whatever portion is
    /// missing (spec §4.8).
    pub fn open(&self, key: CacheKey, wanted: Range) -> Result<Handle, CacheError> {
        let metadata = self.metadata.lock().expect("metadata lock poisoned");
        match fsmd_begin_read(metadata.table(), &key, wanted) {
            Ok(OpenOutcome::Read(elem)) => {
                return Ok(Handle::Read(ReadHandle::new(
                    key,
                    elem,
                    &self.layout,
                    Arc::clone(&self.queue),
                    Arc::clone(&self.writer),
                )))
            }
            Ok(OpenOutcome::Write { .. }) => unreachable!("fsmd_begin_read never returns Write"),
            Err(CacheError::ObjectNotPresent) => {}
            Err(e) => return Err(e),
        }

        if metadata.capacity_remaining() == 0 {
            return Err(CacheError::StorageExhausted);
        }

        match fsmd_begin_write(metadata.table(), &key, wanted)? {
            OpenOutcome::Write { key, reserved } => Ok(Handle::Write(WriteHandle::new(
                key,
                reserved,
                Arc::clone(&self.writer),
                Arc::clone(&self.metadata),
                Arc::clone(&self.queue),
                self.layout,
            ))),
            OpenOutcome::Read(_) => unreachable!("fsmd_begin_write never returns Read"),
        }
    }
}
