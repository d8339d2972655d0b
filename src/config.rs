//! Cache configuration: the storage path list and the knobs from spec §6
//! (`cache_storage_cfg`, `cache_volume_threads`,
//! `cache_min_avg_object_size_KB`).
//!
//! Builder pattern grounded on the teacher's
//! `variants/disk_v2::common::DiskBufferConfigBuilder`: field setters that
//! can't fail, validation deferred to `build()`.

use std::fs;
use std::path::{Path, PathBuf};

use snafu::Snafu;

const MIN_AVG_OBJECT_SIZE_KB: u64 = 8;
const MAX_AVG_OBJECT_SIZE_KB: u64 = 8 * 1024 * 1024;

#[derive(Debug, Snafu)]
pub enum BuildError {
    #[snafu(display("cache_volume_threads must be at least 2, got {value}"))]
    TooFewThreads { value: usize },

    #[snafu(display(
        "cache_min_avg_object_size_KB must be between {MIN_AVG_OBJECT_SIZE_KB} and {MAX_AVG_OBJECT_SIZE_KB}, got {value}"
    ))]
    AvgObjectSizeOutOfRange { value: u64 },

    #[snafu(display("no volume paths configured"))]
    NoVolumePaths,
}

/// Validated cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub volume_paths: Vec<PathBuf>,
    pub volume_threads: usize,
    pub min_avg_object_size_bytes: u64,
    pub flush_interval: std::time::Duration,
}

#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    volume_paths: Vec<PathBuf>,
    volume_threads: Option<usize>,
    min_avg_object_size_kb: Option<u64>,
    flush_interval: Option<std::time::Duration>,
}

impl CacheConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.volume_paths = paths;
        self
    }

    pub fn volume_threads(mut self, n: usize) -> Self {
        self.volume_threads = Some(n);
        self
    }

    pub fn min_avg_object_size_kb(mut self, kb: u64) -> Self {
        self.min_avg_object_size_kb = Some(kb);
        self
    }

    pub fn flush_interval(mut self, d: std::time::Duration) -> Self {
        self.flush_interval = Some(d);
        self
    }

    pub fn build(self) -> Result<CacheConfig, BuildError> {
        if self.volume_paths.is_empty() {
            return NoVolumePathsSnafu.fail();
        }
        let volume_threads = self.volume_threads.unwrap_or(4);
        if volume_threads < 2 {
            return TooFewThreadsSnafu { value: volume_threads }.fail();
        }
        let min_avg_object_size_kb = self.min_avg_object_size_kb.unwrap_or(64);
        if !(MIN_AVG_OBJECT_SIZE_KB..=MAX_AVG_OBJECT_SIZE_KB).contains(&min_avg_object_size_kb) {
            return AvgObjectSizeOutOfRangeSnafu { value: min_avg_object_size_kb }.fail();
        }

        Ok(CacheConfig {
            volume_paths: self.volume_paths,
            volume_threads,
            min_avg_object_size_bytes: min_avg_object_size_kb * 1024,
            flush_interval: self.flush_interval.unwrap_or(std::time::Duration::from_secs(5)),
        })
    }
}

/// Parses `cache_storage_cfg`: one volume path per line, blank lines and
/// `#`-prefixed comments ignored (spec §6).
pub fn load_storage_paths(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_too_few_threads() {
        let err = CacheConfigBuilder::new()
            .volume_paths(vec![PathBuf::from("/dev/null")])
            .volume_threads(1)
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::TooFewThreads { value: 1 }));
    }

    #[test]
    fn build_rejects_empty_volume_list() {
        let err = CacheConfigBuilder::new().build().unwrap_err();
        assert!(matches!(err, BuildError::NoVolumePaths));
    }

    #[test]
    fn build_accepts_defaults() {
        let cfg = CacheConfigBuilder::new()
            .volume_paths(vec![PathBuf::from("/dev/null")])
            .build()
            .unwrap();
        assert_eq!(cfg.volume_threads, 4);
        assert_eq!(cfg.min_avg_object_size_bytes, 64 * 1024);
    }

    #[test]
    fn parses_storage_paths_ignoring_comments_and_blanks() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("paths.cfg");
        fs::write(&file, "/dev/sda1\n# comment\n\n/dev/sdb1\n").unwrap();
        let paths = load_storage_paths(&file).unwrap();
        assert_eq!(paths, vec![PathBuf::from("/dev/sda1"), PathBuf::from("/dev/sdb1")]);
    }
}
