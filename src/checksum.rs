//! Shared trace/output checksum helper. Every loop (AFL, scheduler
//! calibration, differential) needs a cheap fingerprint of a byte slice to
//! dedupe crash/hang buckets and novelty tuples; xxh3 is the fast hash the
//! corpus already depends on, so all three reuse this instead of
//! hand-rolling FNV separately.

use xxhash_rust::xxh3::xxh3_64;

/// Truncated to 32 bits, the bucket width the rest of the engine uses for
/// `crash_hashes`/`hang_hashes`/novelty-tuple sets.
pub fn hash32(bytes: &[u8]) -> u32 {
    xxh3_64(bytes) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash32_is_deterministic() {
        assert_eq!(hash32(b"abc"), hash32(b"abc"));
    }

    #[test]
    fn hash32_distinguishes_inputs() {
        assert_ne!(hash32(b"abc"), hash32(b"abd"));
    }
}
