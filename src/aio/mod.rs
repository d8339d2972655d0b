//! The per-volume asynchronous I/O task queue and worker threads (spec §3
//! "AIO task queue"/"AIO service", §4.6, §5, component C7).

pub mod queue;
pub mod service;
pub mod task;

pub use queue::AioTaskQueue;
pub use service::AioService;
pub use task::{AioOp, AioTask};
