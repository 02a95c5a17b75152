//! Payload masking as defined in [RFC 6455 Section 5.3](https://datatracker.ietf.org/doc/html/rfc6455#section-5.3).
//!
//! Every payload byte is XORed with one byte of a 4-byte key. The transform is its own inverse,
//! so the same function masks on the sending side and unmasks on the receiving side.

/// Masks or unmasks `buf` with `mask`, starting at byte `offset` of the frame payload.
///
/// Byte `i` of `buf` is XORed with `mask[(offset + i) % 4]`. Passing the number of payload bytes
/// already processed as `offset` lets a frame be masked chunk by chunk while it streams.
#[inline]
pub fn apply_mask(buf: &mut [u8], mask: [u8; 4], offset: usize) {
    apply_mask_fast32(buf, rotate(mask, offset));
}

/// Returns the key as seen from payload position `offset`.
#[inline]
fn rotate(mask: [u8; 4], offset: usize) -> [u8; 4] {
    [
        mask[offset & 3],
        mask[(offset + 1) & 3],
        mask[(offset + 2) & 3],
        mask[(offset + 3) & 3],
    ]
}

/// A safe unoptimized mask application.
#[inline]
fn apply_mask_fallback(buf: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= mask[i & 3];
    }
}

/// Faster version of `apply_mask()` which operates on 4-byte blocks.
#[inline]
fn apply_mask_fast32(buf: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);

    let mut words = buf.chunks_exact_mut(4);
    for word in &mut words {
        let value = u32::from_ne_bytes([word[0], word[1], word[2], word[3]]) ^ mask_u32;
        word.copy_from_slice(&value.to_ne_bytes());
    }
    // the remainder starts on a multiple of 4, so the key is not rotated
    apply_mask_fallback(words.into_remainder(), mask);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_mask() {
        let mask = [0x6d, 0xb6, 0xb2, 0x80];
        let unmasked = [
            0xf3, 0x00, 0x01, 0x02, 0x03, 0x80, 0x81, 0x82, 0xff, 0xfe, 0x00, 0x17, 0x74, 0xf9,
            0x12, 0x03,
        ];

        for data_len in 0..=unmasked.len() {
            let unmasked = &unmasked[0..data_len];
            // Check masking with different alignment.
            for off in 0..=3 {
                if unmasked.len() < off {
                    continue;
                }
                let mut masked = unmasked.to_vec();
                apply_mask_fallback(&mut masked[off..], mask);

                let mut masked_fast = unmasked.to_vec();
                apply_mask_fast32(&mut masked_fast[off..], mask);

                assert_eq!(masked, masked_fast);
            }
        }
    }

    #[test]
    fn test_mask_unmask_identity() {
        let mask = [0xAA, 0xBB, 0xCC, 0xDD];
        let original = b"Hello, World! This is a test message with various lengths.";

        let mut data = original.to_vec();
        apply_mask(&mut data, mask, 0);

        // Data should be masked now
        assert_ne!(&data[..], &original[..]);

        // Apply mask again to unmask
        apply_mask(&mut data, mask, 0);

        assert_eq!(&data[..], &original[..]);
    }

    #[test]
    fn test_mask_all_zeros() {
        let mask = [0x00, 0x00, 0x00, 0x00];
        let original = b"Test data";

        let mut data = original.to_vec();
        apply_mask(&mut data, mask, 0);

        assert_eq!(&data[..], &original[..]);
    }

    #[test]
    fn test_mask_all_ones() {
        let mask = [0xFF, 0xFF, 0xFF, 0xFF];
        let mut data = vec![0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77];

        apply_mask(&mut data, mask, 3);

        assert_eq!(data, vec![0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, 0x99, 0x88]);
    }

    #[test]
    fn test_mask_edge_cases() {
        let mask = [0x12, 0x34, 0x56, 0x78];

        let mut empty: Vec<u8> = vec![];
        apply_mask(&mut empty, mask, 0);
        assert!(empty.is_empty());

        let mut single = vec![0xAB];
        apply_mask(&mut single, mask, 0);
        assert_eq!(single, vec![0xAB ^ 0x12]);

        let mut three = vec![0xAB, 0xCD, 0xEF];
        apply_mask(&mut three, mask, 0);
        assert_eq!(three, vec![0xAB ^ 0x12, 0xCD ^ 0x34, 0xEF ^ 0x56]);
    }

    #[test]
    fn test_mask_with_offset() {
        let mask = [0x12, 0x34, 0x56, 0x78];

        let mut data = vec![0x00, 0x00, 0x00];
        apply_mask(&mut data, mask, 1);
        assert_eq!(data, vec![0x34, 0x56, 0x78]);

        let mut data = vec![0x00, 0x00];
        apply_mask(&mut data, mask, 7);
        assert_eq!(data, vec![0x78, 0x12]);
    }

    #[test]
    fn test_mask_chunked_matches_whole() {
        let mask = [0x01, 0x23, 0x45, 0x67];
        let original: Vec<u8> = (0..1000).map(|i| (i * 7) as u8).collect();

        let mut whole = original.clone();
        apply_mask(&mut whole, mask, 0);

        for chunk_size in [1, 2, 3, 5, 64, 333] {
            let mut chunked = original.clone();
            let mut offset = 0;
            for chunk in chunked.chunks_mut(chunk_size) {
                apply_mask(chunk, mask, offset);
                offset += chunk.len();
            }
            assert_eq!(whole, chunked, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_mask_large_buffer() {
        let mask = [0x01, 0x02, 0x03, 0x04];
        let mut data: Vec<u8> = (0..10000).map(|i| (i % 256) as u8).collect();
        let original = data.clone();

        apply_mask(&mut data, mask, 0);

        for (i, &byte) in data.iter().enumerate() {
            assert_eq!(byte, original[i] ^ mask[i % 4], "Mismatch at index {}", i);
        }
    }
}
