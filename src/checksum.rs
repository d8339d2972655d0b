//! Fragment header checksum (spec §3 "Aggregate write block", §7; original
//! `xproxy-beta/cache/object_frag_hdr.h`).
//!
//! The spec is explicit that this guard is weak by design (Non-goals, §1): it
//! protects against truncation and misplacement of a fragment, not against
//! malicious tampering. Adler-32 has no dedicated, widely-used crate in this
//! codebase's dependency stack (unlike CRC32C, which the teacher pulls in via
//! `crc32fast` for its own record checksums) and the algorithm is a dozen lines
//! of arithmetic, so it is implemented directly here rather than adding a
//! dependency purely to wrap a rolling sum.

const MOD_ADLER: u32 = 65521;

/// Adler-32 of `data`, continuing from the given running `state` (pass
/// `adler32::INITIAL` to start a new checksum).
pub const INITIAL: u32 = 1;

pub fn adler32(mut state: u32, data: &[u8]) -> u32 {
    let mut a = state & 0xffff;
    let mut b = (state >> 16) & 0xffff;
    for &byte in data {
        a = (a + byte as u32) % MOD_ADLER;
        b = (b + a) % MOD_ADLER;
    }
    state = (b << 16) | a;
    state
}

/// The 8-byte fragment header written immediately before a fragment's data in
/// the aggregate write block (spec §3, §6 on-disk layout).
///
/// Currently computed over the fragment's key and range only (not its data),
/// matching the original's tradeoff: cheaper, at the cost of not catching a
/// data-only corruption. See `object_frag_hdr.h`'s comment making the same
/// tradeoff explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader(u64);

pub const FRAGMENT_HEADER_LEN: usize = 8;

impl FragmentHeader {
    pub fn compute(key: &[u8; 16], rng_offset: u64, rng_size: u32, disk_offset: u64) -> Self {
        let mut sum = INITIAL;
        sum = adler32(sum, key);
        sum = adler32(sum, &rng_offset.to_le_bytes());
        sum = adler32(sum, &rng_size.to_le_bytes());
        sum = adler32(sum, &disk_offset.to_le_bytes());
        // Widen to 64 bits purely to give the on-disk header a fixed 8-byte
        // footprint that leaves room to strengthen the checksum later without
        // changing the layout; the high 32 bits are always zero today.
        FragmentHeader(sum as u64)
    }

    pub fn to_bytes(self) -> [u8; FRAGMENT_HEADER_LEN] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: [u8; FRAGMENT_HEADER_LEN]) -> Self {
        FragmentHeader(u64::from_le_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_and_range_same_checksum() {
        let key = [7u8; 16];
        let a = FragmentHeader::compute(&key, 0, 4096, 0);
        let b = FragmentHeader::compute(&key, 0, 4096, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn differing_range_differs() {
        let key = [7u8; 16];
        let a = FragmentHeader::compute(&key, 0, 4096, 0);
        let b = FragmentHeader::compute(&key, 4096, 4096, 0);
        assert_ne!(a, b);
    }

    #[test]
    fn round_trips_through_bytes() {
        let key = [1u8; 16];
        let hdr = FragmentHeader::compute(&key, 128, 256, 512);
        assert_eq!(FragmentHeader::from_bytes(hdr.to_bytes()), hdr);
    }
}
