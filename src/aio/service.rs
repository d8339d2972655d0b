//! The per-volume AIO thread pool: one dedicated writer thread plus N-1
//! reader threads, all pulling off the same [`AioTaskQueue`] (spec §4.6,
//! §5; original `aio_service.h`).

use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{instrument, warn};

use crate::aio::queue::AioTaskQueue;
use crate::volume::VolumeFd;

pub struct AioService {
    queue: Arc<AioTaskQueue>,
    workers: Vec<JoinHandle<()>>,
}

impl AioService {
    /// Spawns `thread_count` OS threads against `vol` (shared read-only
    /// since all mutation happens through the single writer thread's
    /// tasks): one dedicated to the write queue, the rest split across the
    /// read queue. `thread_count` must be at least 2 (spec §6
    /// `cache_volume_threads` validation, enforced by
    /// [`crate::config::CacheConfigBuilder`]).
    #[instrument(skip(vol), fields(thread_count))]
    pub fn start(vol: Arc<VolumeFd>, thread_count: usize) -> Self {
        assert!(thread_count >= 2, "aio service needs at least a writer and one reader thread");
        let queue = Arc::new(AioTaskQueue::new());
        let mut workers = Vec::with_capacity(thread_count);

        {
            let queue = Arc::clone(&queue);
            let vol = Arc::clone(&vol);
            workers.push(
                std::thread::Builder::new()
                    .name("xproxy-cache-aio-writer".to_string())
                    .spawn(move || run_writer(queue, vol))
                    .expect("failed to spawn aio writer thread"),
            );
        }
        for i in 0..(thread_count - 1) {
            let queue = Arc::clone(&queue);
            let vol = Arc::clone(&vol);
            workers.push(
                std::thread::Builder::new()
                    .name(format!("xproxy-cache-aio-reader-{i}"))
                    .spawn(move || run_reader(queue, vol))
                    .expect("failed to spawn aio reader thread"),
            );
        }

        Self { queue, workers }
    }

    pub fn queue(&self) -> &Arc<AioTaskQueue> {
        &self.queue
    }

    /// Stops accepting new work and waits for in-flight tasks to drain.
    /// Tasks still queued when `stop` is called are run to completion, not
    /// discarded — callers that want to cancel outstanding work should drop
    /// their task's receiver instead (spec §7 "operation aborted").
    pub fn shutdown(mut self) {
        self.queue.stop();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("aio worker thread panicked during shutdown");
            }
        }
    }
}

fn run_writer(queue: Arc<AioTaskQueue>, vol: Arc<VolumeFd>) {
    while let Some(task) = queue.pop_write() {
        task.run(&vol);
    }
}

fn run_reader(queue: Arc<AioTaskQueue>, vol: Arc<VolumeFd>) {
    while let Some(task) = queue.pop_read() {
        task.run(&vol);
    }
}
