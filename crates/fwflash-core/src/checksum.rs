//! CRC32 helpers
//!
//! IEEE 802.3 CRC32 (the zlib/PNG polynomial), as used by packet trailers
//! and file change detection.

use crc32fast::Hasher;

/// CRC32 of a single buffer
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// CRC32 over the concatenation of several buffers, without copying them
pub fn crc32_parts(parts: &[&[u8]]) -> u32 {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(&[]), 0);
    }

    proptest! {
        #[test]
        fn prop_parts_match_whole(data in proptest::collection::vec(any::<u8>(), 0..512), cut in 0usize..512) {
            let cut = cut.min(data.len());
            let (head, tail) = data.split_at(cut);
            prop_assert_eq!(crc32_parts(&[head, tail]), crc32(&data));
        }
    }
}
