//! End-to-end scenarios against a real (file-backed) volume: write a range,
//! read it back, and write a second range that only partially overlaps the
//! first (spec §8 "open miss" / "open hit" / "partial coverage").

use tempfile::tempdir;

use xproxy_cache::error::CacheError;
use xproxy_cache::fs::CacheFs;
use xproxy_cache::ops::Handle;
use xproxy_cache::range::Range;
use xproxy_cache::CacheKey;

const VOLUME_LEN: u64 = 16 * 1024 * 1024;
const AVG_OBJECT_SIZE_BYTES: u64 = 8 * 1024;
const THREADS: usize = 2;

fn open_volume(dir: &std::path::Path, name: &str) -> CacheFs {
    CacheFs::create(&dir.join(name), VOLUME_LEN, AVG_OBJECT_SIZE_BYTES, THREADS).unwrap()
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let dir = tempdir().unwrap();
    let fs = open_volume(dir.path(), "vol0");
    let key = CacheKey::fingerprint(b"http://example.com/a");
    let wanted = Range::new(0, 4096);
    let body = vec![0xABu8; 4096];

    match fs.open_range(key, wanted).unwrap() {
        Handle::Write(mut w) => {
            w.write(&body).unwrap();
            w.finish().unwrap();
        }
        Handle::Read(_) => panic!("expected a write handle on first open"),
    }

    match fs.open_range(key, wanted).unwrap() {
        Handle::Read(mut r) => {
            let got = r.read().await.unwrap();
            assert_eq!(got, Some(body));
            assert_eq!(r.read().await.unwrap(), None, "second read must signal eof");
        }
        Handle::Write(_) => panic!("expected a read handle once the range is cached"),
    }
}

#[tokio::test]
async fn wider_request_reserves_only_the_uncovered_remainder() {
    let dir = tempdir().unwrap();
    let fs = open_volume(dir.path(), "vol0");
    let key = CacheKey::fingerprint(b"http://example.com/b");
    let first = vec![0x11u8; 4096];

    match fs.open_range(key, Range::new(0, 4096)).unwrap() {
        Handle::Write(mut w) => {
            w.write(&first).unwrap();
            w.finish().unwrap();
        }
        Handle::Read(_) => panic!("nothing cached yet"),
    }

    // Asking for [0, 8192) now overlaps the 4096 bytes already cached; the
    // reservation should trim down to just the missing tail.
    let second = vec![0x22u8; 4096];
    match fs.open_range(key, Range::new(0, 8192)).unwrap() {
        Handle::Write(mut w) => {
            assert_eq!(w.remaining(), 4096);
            w.write(&second).unwrap();
            w.finish().unwrap();
        }
        Handle::Read(_) => panic!("range is only partially covered"),
    }

    match fs.open_range(key, Range::new(4096, 4096)).unwrap() {
        Handle::Read(mut r) => assert_eq!(r.read().await.unwrap(), Some(second)),
        Handle::Write(_) => panic!("second range should now be cached"),
    }
}

#[tokio::test]
async fn reservation_below_minimum_size_is_rejected() {
    let dir = tempdir().unwrap();
    let fs = open_volume(dir.path(), "vol0");
    let key = CacheKey::fingerprint(b"http://example.com/tiny");

    let err = fs.open_range(key, Range::new(0, 100)).unwrap_err();
    assert!(matches!(err, CacheError::NewObjectTooSmall { size: 100 }));
}

#[tokio::test]
async fn writer_stats_reflect_a_completed_flush() {
    let dir = tempdir().unwrap();
    let fs = open_volume(dir.path(), "vol0");
    let key = CacheKey::fingerprint(b"http://example.com/stats");
    let body = vec![0x33u8; 4096];

    let before = fs.writer_stats();
    assert_eq!(before.blocks_flushed, 0);

    match fs.open_range(key, Range::new(0, 4096)).unwrap() {
        Handle::Write(mut w) => {
            w.write(&body).unwrap();
            w.finish().unwrap();
        }
        Handle::Read(_) => panic!("nothing cached yet"),
    }

    let after = fs.writer_stats();
    assert_eq!(after.fragments_written, 1);
    assert_eq!(after.bytes_written, 4096);
    assert_eq!(after.blocks_flushed, 1, "finish() rolls over the current block");
}

#[tokio::test]
async fn flush_then_reopen_volume_keeps_cached_data() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vol0");
    let key = CacheKey::fingerprint(b"http://example.com/c");
    let body = vec![0x77u8; 4096];

    let fs = CacheFs::create(&path, VOLUME_LEN, AVG_OBJECT_SIZE_BYTES, THREADS).unwrap();
    match fs.open_range(key, Range::new(0, 4096)).unwrap() {
        Handle::Write(mut w) => {
            w.write(&body).unwrap();
            w.finish().unwrap();
        }
        Handle::Read(_) => panic!("nothing cached yet"),
    }
    fs.close().unwrap();

    let fs = CacheFs::open(&path, AVG_OBJECT_SIZE_BYTES, THREADS).unwrap();
    match fs.open_range(key, Range::new(0, 4096)).unwrap() {
        Handle::Read(mut r) => assert_eq!(r.read().await.unwrap(), Some(body)),
        Handle::Write(_) => panic!("metadata flush should have survived a reopen"),
    }
    fs.close().unwrap();
}
