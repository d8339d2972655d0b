//! A handle over a reserved, not-yet-present range, accepting fragments of
//! data and feeding them to the volume's aggregate writer (spec §4.8
//! "Write").
//!
//! Each [`WriteHandle::write`] call hands its bytes straight to
//! [`crate::agg::writer::AggWriter::write`], which does its own fragment
//! splitting; any blocks that fill up as a result are immediately dispatched
//! to the AIO service's write queue rather than buffered here, so a large
//! streamed write doesn't need to hold the whole object in memory (spec §5
//! "bounded memory use").
//!
//! One known gap: a block that rolls over mid-write is gone from
//! [`crate::agg::block::AggWriteBlock`] the instant the roll happens, but its
//! fragments' in-memory flag isn't cleared until the dispatched write
//! actually lands (see `dispatch_flush`). A read racing that narrow window
//! sees neither the in-memory copy nor a completed disk write and fails with
//! [`CacheError::CorruptedObjectData`] rather than blocking for the flush;
//! closing the gap would mean giving a rolled-over block its own "flushing"
//! state for reads to fall back to, which is future work.

use std::sync::{Arc, Mutex};

use tracing::instrument;

use crate::agg::writer::AggWriter;
use crate::aio::queue::AioTaskQueue;
use crate::aio::task::{AioOp, AioOutcome, AioTask};
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::metadata::FsMetadata;
use crate::range::Range;
use crate::units::VOLUME_BLOCK_SIZE;
use crate::volume::VolumeLayout;

pub struct WriteHandle {
    key: CacheKey,
    reserved: Range,
    written: u64,
    writer: Arc<Mutex<AggWriter>>,
    metadata: Arc<Mutex<FsMetadata>>,
    queue: Arc<AioTaskQueue>,
    layout: VolumeLayout,
}

impl WriteHandle {
    pub fn new(
        key: CacheKey,
        reserved: Range,
        writer: Arc<Mutex<AggWriter>>,
        metadata: Arc<Mutex<FsMetadata>>,
        queue: Arc<AioTaskQueue>,
        layout: VolumeLayout,
    ) -> Self {
        Self { key, reserved, written: 0, writer, metadata, queue, layout }
    }

    pub fn remaining(&self) -> u64 {
        self.reserved.size - self.written
    }

    /// Accepts the next chunk of data. Fails with
    /// [`CacheError::UnexpectedData`] if it would overrun the reservation.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn write(&mut self, data: &[u8]) -> Result<(), CacheError> {
        if data.len() as u64 > self.remaining() {
            return Err(CacheError::UnexpectedData);
        }

        let (elems, flushes) = {
            let mut writer = self.writer.lock().expect("aggregate writer lock poisoned");
            writer.write(self.key, self.reserved.begin + self.written, data, self.layout.data_area_bytes)
        };
        self.written += data.len() as u64;

        {
            let mut metadata = self.metadata.lock().expect("metadata lock poisoned");
            for elem in elems {
                let _evicted = metadata.table_mut().entry_or_insert(self.key).add_range(elem);
            }
        }

        for flush in flushes {
            self.dispatch_flush(flush);
        }

        Ok(())
    }

    fn dispatch_flush(&self, flush: crate::agg::writer::PendingFlush) {
        let absolute_offset = self.layout.data_area_offset + flush.disk_offset_bytes;
        let produced = flush.produced;
        let metadata_for_task = Arc::clone(&self.metadata);
        let (task, _rx) = AioTask::new(AioOp::Write, move |vol| {
            vol.write_at(&flush.bytes, absolute_offset)?;
            // The fragments were already inserted into the table when they
            // were written; now that the block is durably on disk, clear
            // their in-memory flag rather than re-inserting them (matches
            // `CacheFs::flush`'s synchronous path).
            let mut metadata = metadata_for_task.lock().expect("metadata lock poisoned");
            metadata.mark_flushed(&produced);
            Ok(AioOutcome::Done)
        });
        self.queue.push(task);
        let mut metadata = self.metadata.lock().expect("metadata lock poisoned");
        let writer = self.writer.lock().expect("aggregate writer lock poisoned");
        let data_area_blocks = self.layout.data_area_bytes / VOLUME_BLOCK_SIZE;
        writer.advance_cursor(metadata.ops_mut(), data_area_blocks);
    }

    /// Forces any partially-filled block to disk. Called once the caller has
    /// finished writing (or given up early); whatever was written stays
    /// cached even if it's short of the original reservation, matching
    /// the original's tolerance for partial fetches (spec §4.8).
    pub fn finish(self) -> Result<(), CacheError> {
        let flush = {
            let mut writer = self.writer.lock().expect("aggregate writer lock poisoned");
            writer.flush_now(self.layout.data_area_bytes)
        };
        if let Some(flush) = flush {
            self.dispatch_flush(flush);
        }
        Ok(())
    }
}
