//! The size-related edge cases from spec §4.8/§3: a single write larger than
//! `MAX_RNG_SIZE` gets split into multiple fragments (the supplemented
//! "fragment splitting" feature), and handles enforce their own reservation
//! bounds.

use tempfile::tempdir;

use xproxy_cache::error::CacheError;
use xproxy_cache::fs::CacheFs;
use xproxy_cache::ops::Handle;
use xproxy_cache::range::{Range, MAX_RNG_SIZE};
use xproxy_cache::CacheKey;

const VOLUME_LEN: u64 = 32 * 1024 * 1024;
const AVG_OBJECT_SIZE_BYTES: u64 = 64 * 1024;
const THREADS: usize = 2;

fn open_volume(dir: &std::path::Path, name: &str) -> CacheFs {
    CacheFs::create(&dir.join(name), VOLUME_LEN, AVG_OBJECT_SIZE_BYTES, THREADS).unwrap()
}

#[tokio::test]
async fn oversized_object_is_split_and_each_fragment_reads_back() {
    let dir = tempdir().unwrap();
    let fs = open_volume(dir.path(), "vol0");
    let key = CacheKey::fingerprint(b"http://example.com/big");

    let max_rng = MAX_RNG_SIZE as u64;
    let total = max_rng * 2 + 10;
    // Distinct bytes per fragment so a misrouted read is caught by the
    // equality check rather than accidentally matching.
    let mut body = Vec::with_capacity(total as usize);
    body.extend(std::iter::repeat(0xAAu8).take(max_rng as usize));
    body.extend(std::iter::repeat(0xBBu8).take(max_rng as usize));
    body.extend(std::iter::repeat(0xCCu8).take(10));

    match fs.open_range(key, Range::new(0, total)).unwrap() {
        Handle::Write(mut w) => {
            assert_eq!(w.remaining(), total);
            w.write(&body).unwrap();
            w.finish().unwrap();
        }
        Handle::Read(_) => panic!("nothing cached yet"),
    }

    // Objects split across fragments are read one handle per fragment (see
    // `ReadHandle`'s docs); the writer always splits at `MAX_RNG_SIZE`
    // boundaries, so the three fragment ranges are known up front.
    match fs.open_range(key, Range::new(0, max_rng)).unwrap() {
        Handle::Read(mut r) => assert_eq!(r.read().await.unwrap(), Some(body[0..max_rng as usize].to_vec())),
        Handle::Write(_) => panic!("first fragment should be cached"),
    }
    match fs.open_range(key, Range::new(max_rng, max_rng)).unwrap() {
        Handle::Read(mut r) => {
            assert_eq!(r.read().await.unwrap(), Some(body[max_rng as usize..2 * max_rng as usize].to_vec()))
        }
        Handle::Write(_) => panic!("second fragment should be cached"),
    }
    match fs.open_range(key, Range::new(2 * max_rng, 10)).unwrap() {
        Handle::Read(mut r) => assert_eq!(r.read().await.unwrap(), Some(body[2 * max_rng as usize..].to_vec())),
        Handle::Write(_) => panic!("third fragment should be cached"),
    }
}

#[tokio::test]
async fn write_past_the_reservation_is_rejected() {
    let dir = tempdir().unwrap();
    let fs = open_volume(dir.path(), "vol0");
    let key = CacheKey::fingerprint(b"http://example.com/overrun");

    match fs.open_range(key, Range::new(0, 4096)).unwrap() {
        Handle::Write(mut w) => {
            let err = w.write(&vec![0u8; 4097]).unwrap_err();
            assert!(matches!(err, CacheError::UnexpectedData));
        }
        Handle::Read(_) => panic!("nothing cached yet"),
    }
}

#[tokio::test]
async fn partial_write_is_still_cached_on_finish() {
    let dir = tempdir().unwrap();
    let fs = open_volume(dir.path(), "vol0");
    let key = CacheKey::fingerprint(b"http://example.com/partial");
    let body = vec![0x42u8; 1024];

    match fs.open_range(key, Range::new(0, 4096)).unwrap() {
        Handle::Write(mut w) => {
            // Only write a quarter of the reserved range, then give up —
            // spec §4.8 tolerates partial fetches rather than discarding
            // whatever was received.
            w.write(&body).unwrap();
            w.finish().unwrap();
        }
        Handle::Read(_) => panic!("nothing cached yet"),
    }

    match fs.open_range(key, Range::new(0, 1024)).unwrap() {
        Handle::Read(mut r) => assert_eq!(r.read().await.unwrap(), Some(body)),
        Handle::Write(_) => panic!("the written portion should be cached"),
    }
}
