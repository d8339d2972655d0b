//! A handle over one already-present range, reading its bytes either
//! straight out of the in-memory aggregate block or by dispatching a task to
//! the volume's AIO service (spec §4.8 "Read").

use std::sync::{Arc, Mutex};

use tracing::instrument;

use crate::agg::writer::AggWriter;
use crate::aio::queue::AioTaskQueue;
use crate::aio::task::{AioOp, AioOutcome, AioTask};
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::range::RangeElem;
use crate::units::VOLUME_BLOCK_SIZE;
use crate::volume::layout::VolumeLayout;

/// A single read against one previously-opened range (spec §4.8). Reading
/// always returns the whole fragment's bytes in one call — objects that
/// span multiple fragments are read one [`ReadHandle`] per fragment, which
/// mirrors how [`crate::agg::writer::AggWriter::write`] produced them.
pub struct ReadHandle {
    key: CacheKey,
    elem: Arc<RangeElem>,
    data_offset: u64,
    queue: Arc<AioTaskQueue>,
    writer: Arc<Mutex<AggWriter>>,
    done: bool,
}

impl ReadHandle {
    pub fn new(
        key: CacheKey,
        elem: Arc<RangeElem>,
        layout: &VolumeLayout,
        queue: Arc<AioTaskQueue>,
        writer: Arc<Mutex<AggWriter>>,
    ) -> Self {
        Self { key, elem, data_offset: layout.data_area_offset, queue, writer, done: false }
    }

    /// Reads the fragment's bytes once. A second call returns
    /// `Ok(None)` (spec §6 "eof"), matching the teacher's pattern of
    /// representing end-of-stream as `Ok(None)` rather than as its own
    /// error variant (see `error.rs` module docs).
    #[instrument(skip(self))]
    pub async fn read(&mut self) -> Result<Option<Vec<u8>>, CacheError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        if self.elem.in_memory() {
            let writer = self.writer.lock().expect("aggregate writer lock poisoned");
            let bytes = writer
                .read_in_memory(&self.elem, &self.key)
                .ok_or(CacheError::CorruptedObjectData)?;
            return Ok(Some(bytes));
        }

        let absolute_offset = self.data_offset + self.elem.disk_offset_blocks() * VOLUME_BLOCK_SIZE;
        let len = crate::checksum::FRAGMENT_HEADER_LEN + self.elem.rng_size() as usize;
        let aligned_len = crate::units::round_to_volume_block(len as u64) as usize;

        let key = self.key;
        let elem = Arc::clone(&self.elem);
        let (task, rx) = AioTask::new(AioOp::Read, move |vol| {
            let mut buf = vec![0u8; aligned_len];
            vol.read_at(&mut buf, absolute_offset)?;
            let header_len = crate::checksum::FRAGMENT_HEADER_LEN;
            let mut header_bytes = [0u8; crate::checksum::FRAGMENT_HEADER_LEN];
            header_bytes.copy_from_slice(&buf[0..header_len]);
            let stored = crate::checksum::FragmentHeader::from_bytes(header_bytes);
            let expected = crate::checksum::FragmentHeader::compute(
                key.as_bytes(),
                elem.rng_offset(),
                elem.rng_size(),
                elem.disk_offset_blocks() * VOLUME_BLOCK_SIZE,
            );
            if stored != expected {
                return Err(CacheError::CorruptedObjectData);
            }
            let data = buf[header_len..header_len + elem.rng_size() as usize].to_vec();
            Ok(AioOutcome::Data(data))
        });
        self.queue.push(task);

        match rx.await {
            Ok(Ok(AioOutcome::Data(data))) => Ok(Some(data)),
            Ok(Ok(AioOutcome::Done)) => Err(CacheError::InternalLogicError {
                reason: "read task completed without data".to_string(),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CacheError::ServiceStopped),
        }
    }
}

impl Drop for ReadHandle {
    fn drop(&mut self) {
        self.elem.atomic_dec_readers();
    }
}
