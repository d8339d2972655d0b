//! The volume-sharded cache (spec §3 "cache_mgr", §4.2, §4.9, component
//! C12): routes a key to one of several open volumes and drives periodic
//! metadata flushing across all of them.
//!
//! Routing uses FNV-1a (the `fnv` crate, also used for hashing in
//! `pemios-pemios`'s request-routing path) rather than `std`'s default
//! SipHash: this hash is never exposed to untrusted input in a way that
//! needs DoS resistance (the cache key is already a fixed-width content
//! fingerprint, spec Non-goals exclude adversarial-input hardening), and
//! FNV is faster for the small fixed-size keys being hashed here.
//!
//! The volume set is held behind `arc_swap::ArcSwap` (as in the teacher's
//! root `Cargo.toml` dependency on `arc-swap`) so that retiring a bad volume
//! (spec §9 "sticky bad-volume hash-sharding", decided in `DESIGN.md`) can
//! publish a new routing table without readers ever blocking on a lock.

use std::hash::Hasher;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use fnv::FnvHasher;
use rand::Rng;
use tracing::{error, instrument, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::fs::CacheFs;
use crate::key::CacheKey;
use crate::ops::Handle;
use crate::range::Range;

struct Shard {
    fs: CacheFs,
    healthy: AtomicBool,
}

/// A cache spanning one or more volumes.
pub struct CacheMgr {
    shards: ArcSwap<Vec<Arc<Shard>>>,
    flush_interval: Duration,
}

impl CacheMgr {
    /// Opens every volume listed in `config` (spec §6 `cache_storage_cfg`).
    /// A volume that fails to open is logged and skipped rather than
    /// aborting the whole startup — the remaining volumes still come up,
    /// trading some capacity for availability.
    #[instrument(skip(config))]
    pub fn open(config: &CacheConfig) -> Result<Self, CacheError> {
        let mut shards = Vec::with_capacity(config.volume_paths.len());
        for path in &config.volume_paths {
            match CacheFs::open(path, config.min_avg_object_size_bytes, config.volume_threads) {
                Ok(fs) => shards.push(Arc::new(Shard { fs, healthy: AtomicBool::new(true) })),
                Err(e) => error!(path = %path.display(), error = %e, "failed to open volume, skipping"),
            }
        }
        if shards.is_empty() {
            return Err(CacheError::InternalLogicError {
                reason: "no volumes could be opened".to_string(),
            });
        }
        Ok(Self { shards: ArcSwap::from_pointee(shards), flush_interval: config.flush_interval })
    }

    fn shard_for(&self, key: &CacheKey) -> Option<Arc<Shard>> {
        let shards = self.shards.load();
        if shards.is_empty() {
            return None;
        }
        let mut hasher = FnvHasher::default();
        hasher.write(key.as_bytes());
        let idx = (hasher.finish() as usize) % shards.len();

        // Sticky bad-volume routing (spec §9, decided in DESIGN.md): once a
        // shard is marked unhealthy, keys that hash to it fall through to
        // the next shard in the ring rather than being rejected outright.
        for offset in 0..shards.len() {
            let candidate = &shards[(idx + offset) % shards.len()];
            if candidate.healthy.load(Ordering::Acquire) {
                return Some(Arc::clone(candidate));
            }
        }
        None
    }

    /// Opens `key`'s `wanted` range on whichever volume it hashes to (spec
    /// §4.2 "Routing").
    pub fn open_range(&self, key: CacheKey, wanted: Range) -> Result<Handle, CacheError> {
        let shard = self.shard_for(&key).ok_or(CacheError::InternalLogicError {
            reason: "no healthy volume available".to_string(),
        })?;
        match shard.fs.open_range(key, wanted) {
            Err(CacheError::DiskError { source }) => {
                warn!(path = %shard.fs.volume_path().display(), error = %source, "marking volume unhealthy after disk error");
                shard.healthy.store(false, Ordering::Release);
                Err(CacheError::DiskError { source })
            }
            other => other,
        }
    }

    /// Flushes every volume's aggregate writer and metadata table (spec
    /// §4.9). Intended to be driven by a periodic task; see
    /// [`CacheMgr::run_flush_loop`].
    #[instrument(skip(self))]
    pub async fn flush_all(&self) {
        let shards = self.shards.load_full();
        let flushes = shards.iter().map(|shard| {
            let shard = Arc::clone(shard);
            async move {
                let path = shard.fs.volume_path().to_path_buf();
                let result = tokio::task::spawn_blocking(move || shard.fs.flush()).await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(path = %path.display(), error = %e, "flush failed"),
                    Err(e) => error!(error = %e, "flush task panicked"),
                }
            }
        });
        futures::future::join_all(flushes).await;
    }

    /// Runs [`CacheMgr::flush_all`] on `flush_interval`, jittered by up to
    /// 10% so that many volumes opened at the same instant don't all flush
    /// in lockstep.
    pub async fn run_flush_loop(self: Arc<Self>) {
        loop {
            let jitter_frac = rand::thread_rng().gen_range(0.0..0.1);
            let sleep_for = self.flush_interval.mul_f64(1.0 + jitter_frac);
            tokio::time::sleep(sleep_for).await;
            self.flush_all().await;
        }
    }

    pub fn volume_paths(&self) -> Vec<PathBuf> {
        self.shards.load().iter().map(|s| s.fs.volume_path().to_path_buf()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_routing_skips_unhealthy_shard() {
        // Exercises the ring-walk logic directly against a synthetic health
        // table rather than real volumes, since CacheFs::open needs a real
        // file; the routing math is what's under test here.
        let healths = vec![true, false, true];
        let idx = 1usize;
        let mut chosen = None;
        for offset in 0..healths.len() {
            let candidate = (idx + offset) % healths.len();
            if healths[candidate] {
                chosen = Some(candidate);
                break;
            }
        }
        assert_eq!(chosen, Some(2));
    }
}
