//! One unit of dispatchable disk work (spec §4.6).
//!
//! Unlike the teacher (whose buffer I/O runs as plain `async fn`s on the
//! tokio runtime), this crate's disk I/O runs on a small dedicated thread
//! pool per volume (spec §5: "one writer thread, N-1 reader threads"), so a
//! task is a boxed closure plus a completion channel rather than a future —
//! closer to the original's `aio_task_queue`'s function-object task, just
//! expressed as a `FnOnce` instead of a virtual `execute()` method.

use tokio::sync::oneshot;

use crate::error::CacheError;
use crate::volume::VolumeFd;

/// What a finished task hands back to its caller.
pub enum AioOutcome {
    Done,
    Data(Vec<u8>),
}

type TaskFn = Box<dyn FnOnce(&VolumeFd) -> Result<AioOutcome, CacheError> + Send + 'static>;

/// Which queue a task belongs on: reads are fanned out across the reader
/// threads, writes are funneled through the single writer thread so the
/// circular cursor in [`crate::agg::writer::AggWriter`] only ever advances
/// from one thread (spec §4.7 "single writer").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AioOp {
    Read,
    Write,
}

pub struct AioTask {
    pub op: AioOp,
    func: TaskFn,
    completion: oneshot::Sender<Result<AioOutcome, CacheError>>,
}

impl AioTask {
    pub fn new(
        op: AioOp,
        func: impl FnOnce(&VolumeFd) -> Result<AioOutcome, CacheError> + Send + 'static,
    ) -> (Self, oneshot::Receiver<Result<AioOutcome, CacheError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { op, func: Box::new(func), completion: tx }, rx)
    }

    /// Runs the task against `vol` and delivers the result. Consumes `self`
    /// since a task executes exactly once.
    pub fn run(self, vol: &VolumeFd) {
        let result = (self.func)(vol);
        // A dropped receiver means the caller gave up (handle closed before
        // the task ran); that's not this task's problem to report.
        let _ = self.completion.send(result);
    }
}
