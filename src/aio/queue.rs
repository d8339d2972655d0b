//! FIFO task queues feeding the AIO worker threads (spec §4.6; original
//! `aio_task_queue.h`).
//!
//! Reads and writes are kept in separate lock-free queues
//! ([`crossbeam_queue::SegQueue`]) so the single writer thread never waits
//! behind reader work and vice versa; a `parking_lot` mutex/condvar pair
//! (the same crate the teacher uses for its own lock-free-adjacent
//! structures' blocking waits) parks idle worker threads instead of
//! spinning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};

use crate::aio::task::{AioOp, AioTask};

#[derive(Default, Debug)]
struct Doorbell {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl Doorbell {
    fn ring(&self) {
        self.condvar.notify_all();
    }

    /// Waits up to 50ms for a `ring()`. The short cap bounds the lost-wakeup
    /// window between a worker's empty `pop()` and its call to `wait()`
    /// (push-then-ring can land in that window) without resorting to a
    /// shared check-and-wait lock around the lock-free queue itself.
    fn wait(&self) {
        let mut guard = self.mutex.lock();
        self.condvar.wait_for(&mut guard, Duration::from_millis(50));
    }
}

#[derive(Debug)]
pub struct AioTaskQueue {
    reads: SegQueue<AioTask>,
    writes: SegQueue<AioTask>,
    doorbell: Doorbell,
    stopped: AtomicBool,
}

impl Default for AioTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AioTaskQueue {
    pub fn new() -> Self {
        Self {
            reads: SegQueue::new(),
            writes: SegQueue::new(),
            doorbell: Doorbell::default(),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn push(&self, task: AioTask) {
        match task.op {
            AioOp::Read => self.reads.push(task),
            AioOp::Write => self.writes.push(task),
        }
        self.doorbell.ring();
    }

    /// Blocks until a write task is available or the queue is stopped.
    pub fn pop_write(&self) -> Option<AioTask> {
        self.pop_from(&self.writes)
    }

    /// Blocks until a read task is available or the queue is stopped.
    pub fn pop_read(&self) -> Option<AioTask> {
        self.pop_from(&self.reads)
    }

    fn pop_from(&self, q: &SegQueue<AioTask>) -> Option<AioTask> {
        loop {
            if let Some(task) = q.pop() {
                return Some(task);
            }
            if self.stopped.load(Ordering::Acquire) {
                return q.pop();
            }
            self.doorbell.wait();
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.doorbell.ring();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
