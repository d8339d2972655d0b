//! One volume's top-level state, tying the on-disk layout, durable
//! metadata, aggregate writer and AIO service together (spec §3 "cache_fs",
//! §4.1, §4.9, component C11).

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use tracing::{info, instrument};

use crate::agg::writer::AggWriter;
use crate::aio::service::AioService;
use crate::error::CacheError;
use crate::key::CacheKey;
use crate::metadata::FsMetadata;
use crate::ops::{CacheFsOps, Handle};
use crate::range::Range;
use crate::volume::{VolumeFd, VolumeLayout};

/// A point-in-time copy of one volume's aggregate-writer counters (see
/// [`CacheFs::writer_stats`]). Plain fields rather than the atomics
/// themselves, since a caller scraping this for a stats system has no use
/// for further mutation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggWriterStatsSnapshot {
    pub fragments_written: u64,
    pub bytes_written: u64,
    pub bytes_wasted: u64,
    pub blocks_flushed: u64,
    pub fragments_evacuated: u64,
}

/// A single open volume (spec §4.1 "Volume open"). Each `CacheFs` owns its
/// own AIO thread pool (`cache_volume_threads` of them, spec §6) and its own
/// aggregate writer; there is exactly one `CacheFs` per configured volume
/// path, held by [`crate::manager::CacheMgr`].
pub struct CacheFs {
    vol: Arc<VolumeFd>,
    metadata: Arc<Mutex<FsMetadata>>,
    writer: Arc<Mutex<AggWriter>>,
    aio: AioService,
    ops: CacheFsOps,
    layout: VolumeLayout,
    volume_path: PathBuf,
}

impl CacheFs {
    /// Opens (or, if the volume has no valid metadata, initializes) the
    /// volume at `volume_path` (spec §4.1). `min_avg_object_size_bytes`
    /// comes from [`crate::config::CacheConfig`] and drives
    /// [`VolumeLayout::compute`]'s metadata-region sizing.
    #[instrument(skip(volume_path), fields(path = %volume_path.display()))]
    pub fn open(
        volume_path: &Path,
        min_avg_object_size_bytes: u64,
        thread_count: usize,
    ) -> Result<Self, CacheError> {
        let vol = Arc::new(VolumeFd::open(volume_path)?);
        let layout = VolumeLayout::compute(vol.len(), min_avg_object_size_bytes);

        let lock_path = lock_file_path(volume_path);
        let metadata = FsMetadata::load_or_create(&vol, layout, &lock_path)?;
        info!(volume_uuid = %metadata.volume_uuid(), entries = metadata.table().len(), "opened volume");

        let ops_record = metadata.ops();
        let writer = Arc::new(Mutex::new(AggWriter::new(&ops_record)));
        let metadata = Arc::new(Mutex::new(metadata));
        let aio = AioService::start(Arc::clone(&vol), thread_count);

        let ops = CacheFsOps::new(Arc::clone(&metadata), Arc::clone(&writer), Arc::clone(aio.queue()), layout);

        Ok(Self { vol, metadata, writer, aio, ops, layout, volume_path: volume_path.to_path_buf() })
    }

    /// Creates a fresh volume file of `len` bytes and opens it, for tests
    /// and for first-time deployment of a file-backed volume.
    pub fn create(
        volume_path: &Path,
        len: u64,
        min_avg_object_size_bytes: u64,
        thread_count: usize,
    ) -> Result<Self, CacheError> {
        VolumeFd::create(volume_path, len)?;
        Self::open(volume_path, min_avg_object_size_bytes, thread_count)
    }

    pub fn volume_path(&self) -> &Path {
        &self.volume_path
    }

    pub fn layout(&self) -> VolumeLayout {
        self.layout
    }

    /// A snapshot of this volume's aggregate-writer counters (spec's
    /// supplemented "Per-writer statistics" — written/wasted bytes, flushed
    /// blocks, evacuations), for an external stats system to scrape.
    pub fn writer_stats(&self) -> AggWriterStatsSnapshot {
        let writer = self.writer.lock().expect("aggregate writer lock poisoned");
        let stats = &writer.stats;
        AggWriterStatsSnapshot {
            fragments_written: stats.fragments_written.load(Ordering::Relaxed),
            bytes_written: stats.bytes_written.load(Ordering::Relaxed),
            bytes_wasted: stats.bytes_wasted.load(Ordering::Relaxed),
            blocks_flushed: stats.blocks_flushed.load(Ordering::Relaxed),
            fragments_evacuated: stats.fragments_evacuated.load(Ordering::Relaxed),
        }
    }

    /// Opens `key`'s `wanted` range for read or write (spec §4.8).
    pub fn open_range(&self, key: CacheKey, wanted: Range) -> Result<Handle, CacheError> {
        self.ops.open(key, wanted)
    }

    /// Flushes the current aggregate block (if non-empty) and the durable
    /// metadata table to disk (spec §4.9 "Metadata flush" — called
    /// periodically by [`crate::manager::CacheMgr`]).
    #[instrument(skip(self))]
    pub fn flush(&self) -> Result<(), CacheError> {
        let flush = {
            let mut writer = self.writer.lock().expect("aggregate writer lock poisoned");
            writer.flush_now(self.layout.data_area_bytes)
        };
        if let Some(flush) = flush {
            let absolute_offset = self.layout.data_area_offset + flush.disk_offset_bytes;
            self.vol.write_at(&flush.bytes, absolute_offset)?;
            let mut metadata = self.metadata.lock().expect("metadata lock poisoned");
            // The fragments in `flush.produced` were already inserted into
            // the table when they were written (see `WriteHandle::write`);
            // now that their block is durably on disk, clear their
            // in-memory flag rather than re-inserting them.
            metadata.mark_flushed(&flush.produced);
            let data_area_blocks = self.layout.data_area_bytes / crate::units::VOLUME_BLOCK_SIZE;
            let writer = self.writer.lock().expect("aggregate writer lock poisoned");
            writer.advance_cursor(metadata.ops_mut(), data_area_blocks);
        }

        let mut metadata = self.metadata.lock().expect("metadata lock poisoned");
        metadata.table_mut().prune_empty();
        metadata.flush(&self.vol)
    }

    /// Flushes and shuts down this volume's AIO threads. Consumes `self` so
    /// callers can't keep issuing requests against a closed volume.
    pub fn close(self) -> Result<(), CacheError> {
        self.flush()?;
        self.aio.shutdown();
        Ok(())
    }
}

fn lock_file_path(volume_path: &Path) -> PathBuf {
    let mut name = volume_path.file_name().map(|n| n.to_owned()).unwrap_or_default();
    name.push(".lock");
    volume_path.with_file_name(name)
}
