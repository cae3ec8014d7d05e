//! Content-hash helpers used by the log collector (spec.md §4.3
//! "Deduplication" and §4.6 "message_hash").

use md5::{Digest, Md5};

/// 16-hex-digit FNV-1a of `s`, used as the `catops.log` `message_hash`
/// attribute (spec.md §4.6). FNV-1a has no crate in this workspace's
/// dependency tree and the algorithm is fully pinned by spec, so it is
/// implemented directly rather than pulled in as a one-function dependency.
pub fn fnv1a_16hex(s: &str) -> String {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}

/// MD5 hex digest of `s`, used as the cross-cycle dedup table key
/// (spec.md §4.3: `MD5(container_or_service || raw_line)`).
pub fn md5_hex(s: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_is_deterministic_and_16_hex_digits() {
        let a = fnv1a_16hex("hello world");
        let b = fnv1a_16hex("hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fnv1a_differs_for_different_input() {
        assert_ne!(fnv1a_16hex("a"), fnv1a_16hex("b"));
    }

    #[test]
    fn md5_matches_known_vector() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
