//! Per-request read/write/open state machines (spec §3 "Object handles",
//! §4.8, component C10).

pub mod open;
pub mod read;
pub mod write;

pub use open::{fsmd_begin_read, fsmd_begin_write, OpenOutcome};
pub use read::ReadHandle;
pub use write::WriteHandle;
