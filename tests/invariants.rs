//! Exercises the table invariants that depend on a live reader outlasting
//! the lock that protects the table (spec §4.3 "object in use", §4.7
//! "evacuation") through the public handle API rather than the table
//! directly.

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
async fn open_reader_blocks_a_truncating_write_until_dropped() {
    let dir = tempdir().unwrap();
    let fs = open_volume(dir.path(), "vol0");
    let key = CacheKey::fingerprint(b"http://example.com/a");
    let body = vec![0x55u8; 4096];

    match fs.open_range(key, Range::new(0, 4096)).unwrap() {
        Handle::Write(mut w) => {
            w.write(&body).unwrap();
            w.finish().unwrap();
        }
        Handle::Read(_) => panic!("nothing cached yet"),
    }

    // Hold a read handle open over the cached range without consuming it —
    // the reader count is incremented at open time, not at the first
    // `read()` call.
    let reader = match fs.open_range(key, Range::new(0, 4096)).unwrap() {
        Handle::Read(r) => r,
        Handle::Write(_) => panic!("range should be cached by now"),
    };

    // A wider write that overlaps the range the reader holds must be
    // rejected while that reader is still open.
    let err = fs.open_range(key, Range::new(0, 8192)).unwrap_err();
    assert!(matches!(err, CacheError::ObjectInUse));

    drop(reader);

    // Once the reader is gone the same request should succeed, reserving
    // only the uncovered tail.
    match fs.open_range(key, Range::new(0, 8192)).unwrap() {
        Handle::Write(w) => assert_eq!(w.remaining(), 4096),
        Handle::Read(_) => panic!("second half still isn't cached"),
    }
}

#[tokio::test]
async fn second_read_of_an_already_open_handle_signals_eof() {
    let dir = tempdir().unwrap();
    let fs = open_volume(dir.path(), "vol0");
    let key = CacheKey::fingerprint(b"http://example.com/b");
    let body = vec![0x99u8; 2048];

    match fs.open_range(key, Range::new(0, 2048)).unwrap() {
        Handle::Write(mut w) => {
            w.write(&body).unwrap();
            w.finish().unwrap();
        }
        Handle::Read(_) => panic!("nothing cached yet"),
    }

    match fs.open_range(key, Range::new(0, 2048)).unwrap() {
        Handle::Read(mut r) => {
            assert_eq!(r.read().await.unwrap(), Some(body));
            assert_eq!(r.read().await.unwrap(), None);
            assert_eq!(r.read().await.unwrap(), None, "eof must be sticky");
        }
        Handle::Write(_) => panic!("range should be cached"),
    }
}
