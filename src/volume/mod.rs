//! Raw block I/O and on-disk layout for one volume (spec §3 "Volume",
//! component C1).

pub mod fd;
pub mod layout;

pub use fd::VolumeFd;
pub use layout::VolumeLayout;
