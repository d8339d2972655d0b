//! Object identity: the 16-byte content-derived fingerprint used as the
//! `fs_table` key (spec §3 "FS node key").
//!
//! The HTTP-layer `cache_key` record itself is out of scope (spec §1); callers
//! hand us anything that can produce a canonical byte representation, and we
//! fingerprint it with MD5 the way the original `fs_node_key_t` does (per
//! `SPEC_FULL.md`'s supplemented-features note on `x3me_libs`'s hashing
//! helpers). MD5 is not a security boundary here, only a fixed-width
//! deduplication key, matching the spec's Non-goal on cryptographic integrity.

use md5::{Digest, Md5};

/// A 16-byte fingerprint identifying one cached object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey([u8; 16]);

impl CacheKey {
    /// Fingerprints the canonical byte form of an HTTP cache key.
    ///
    /// `canonical` must already reflect whatever normalization the HTTP layer
    /// performs (scheme/host casing, query ordering, vary-headers, etc.); this
    /// type only turns bytes into a fixed-width key.
    pub fn fingerprint(canonical: &[u8]) -> Self {
        let mut hasher = Md5::new();
        hasher.update(canonical);
        let digest = hasher.finalize();
        CacheKey(digest.into())
    }

    pub fn from_raw(bytes: [u8; 16]) -> Self {
        CacheKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_fingerprint() {
        let a = CacheKey::fingerprint(b"http://example.com/a");
        let b = CacheKey::fingerprint(b"http://example.com/a");
        assert_eq!(a, b);
    }

    #[test]
    fn different_bytes_different_fingerprint() {
        let a = CacheKey::fingerprint(b"http://example.com/a");
        let b = CacheKey::fingerprint(b"http://example.com/b");
        assert_ne!(a, b);
    }
}
