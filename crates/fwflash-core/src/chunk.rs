//! Splitting firmware payloads into bounded transfers
//!
//! [`split`] is a pure function of its inputs: iterating it twice yields
//! the same chunks in the same ascending order. Each protocol decides for
//! itself how to encode [`Chunk::is_last`] on the wire.

/// One bounded piece of a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Position in the sequence, starting at 0
    pub index: usize,
    /// Byte offset into the source buffer
    pub offset: usize,
    /// Device address (base address + offset)
    pub address: u32,
    /// The bytes of this chunk
    pub data: &'a [u8],
    /// Set on the final chunk only
    pub is_last: bool,
}

impl Chunk<'_> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Iterator returned by [`split`]
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    data: &'a [u8],
    max_chunk_size: usize,
    base_address: u32,
    next: usize,
    total: usize,
}

/// Split `data` into chunks of at most `max_chunk_size` bytes
///
/// An empty buffer yields a single empty chunk flagged as last, so callers
/// always have one terminating transfer to send.
///
/// # Panics
///
/// Panics if `max_chunk_size` is 0.
pub fn split(data: &[u8], max_chunk_size: usize) -> Chunks<'_> {
    assert!(max_chunk_size > 0, "chunk size must be non-zero");
    let total = if data.is_empty() {
        1
    } else {
        data.len().div_ceil(max_chunk_size)
    };
    Chunks {
        data,
        max_chunk_size,
        base_address: 0,
        next: 0,
        total,
    }
}

impl<'a> Chunks<'a> {
    /// Offset every chunk's [`Chunk::address`] by `address`
    pub fn with_base_address(mut self, address: u32) -> Self {
        self.base_address = address;
        self
    }

    /// Number of chunks in the whole sequence
    pub fn total(&self) -> usize {
        self.total
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        self.next += 1;

        let offset = (index * self.max_chunk_size).min(self.data.len());
        let end = (offset + self.max_chunk_size).min(self.data.len());
        Some(Chunk {
            index,
            offset,
            address: self.base_address.wrapping_add(offset as u32),
            data: &self.data[offset..end],
            is_last: index + 1 == self.total,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_split_exact_multiple() {
        let data = [0u8; 3000];
        let chunks: Vec<_> = split(&data, 1000).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].offset, 2000);
        assert!(chunks[2].is_last);
        assert!(!chunks[1].is_last);
    }

    #[test]
    fn test_split_with_remainder_and_address() {
        let data: Vec<u8> = (0..=255).collect();
        let chunks: Vec<_> = split(&data, 100).with_base_address(0x2_0000).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 56);
        assert_eq!(chunks[2].address, 0x2_00C8);
        assert_eq!(chunks[1].data[0], 100);
    }

    #[test]
    fn test_split_empty() {
        let chunks: Vec<_> = split(&[], 16).collect();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
        assert!(chunks[0].is_last);
    }

    #[test]
    #[should_panic]
    fn test_split_zero_size() {
        let _ = split(&[1, 2, 3], 0);
    }

    proptest! {
        #[test]
        fn prop_chunks_partition_input(len in 0usize..4096, size in 1usize..600) {
            let data: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let chunks = split(&data, size);
            let total = chunks.total();
            prop_assert_eq!(chunks.len(), total);

            let mut expected_offset = 0;
            let mut last_count = 0;
            let mut rebuilt = Vec::with_capacity(len);
            for (i, chunk) in chunks.enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.offset, expected_offset);
                prop_assert!(chunk.len() <= size);
                expected_offset += chunk.len();
                rebuilt.extend_from_slice(chunk.data);
                if chunk.is_last {
                    last_count += 1;
                    prop_assert_eq!(i, total - 1);
                }
            }
            prop_assert_eq!(expected_offset, len);
            prop_assert_eq!(last_count, 1);
            prop_assert_eq!(rebuilt, data);
        }
    }
}
