//! Incremental UTF-8 validation of text payloads that arrive in arbitrary chunks.
#[cfg(feature = "simd")]
use simdutf8::compat::from_utf8;
#[cfg(not(feature = "simd"))]
use std::str::from_utf8;

/// Validates a complete byte sequence.
pub(crate) fn validate(input: &[u8]) -> Option<&str> {
    from_utf8(input).ok()
}

/// Validates a byte stream chunk by chunk.
///
/// A code point split across chunk boundaries is held back until the following chunk completes
/// it. The stream is valid once every chunk was accepted and no bytes are left pending.
#[derive(Debug, Default, Clone)]
pub(crate) struct Utf8Validator {
    /// An incomplete code point at the end of the last chunk.
    pending: [u8; 4],
    pending_len: usize,
    invalid: bool,
}

impl Utf8Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk. Returns `false` as soon as the stream is known to be invalid.
    pub fn feed(&mut self, mut input: &[u8]) -> bool {
        if self.invalid {
            return false;
        }

        if self.pending_len > 0 {
            // complete the held back code point, one byte at a time, it has at most 3 more bytes
            let mut tmp = [0u8; 4];
            tmp[..self.pending_len].copy_from_slice(&self.pending[..self.pending_len]);
            let mut len = self.pending_len;

            loop {
                match from_utf8(&tmp[..len]) {
                    Ok(_) => break,
                    Err(err) if err.error_len().is_some() => return self.fail(),
                    Err(_) => {}
                }
                let Some((&byte, rest)) = input.split_first() else {
                    self.pending[..len].copy_from_slice(&tmp[..len]);
                    self.pending_len = len;
                    return true;
                };
                if len == tmp.len() {
                    return self.fail();
                }
                tmp[len] = byte;
                len += 1;
                input = rest;
            }
            self.pending_len = 0;
        }

        match from_utf8(input) {
            Ok(_) => true,
            Err(err) => match err.error_len() {
                Some(_) => self.fail(),
                None => {
                    let tail = &input[err.valid_up_to()..];
                    self.pending[..tail.len()].copy_from_slice(tail);
                    self.pending_len = tail.len();
                    true
                }
            },
        }
    }

    /// Returns `true` if every chunk fed so far is valid and no code point is left incomplete.
    pub fn is_complete(&self) -> bool {
        !self.invalid && self.pending_len == 0
    }

    /// Returns `true` if no invalid sequence was seen so far.
    pub fn is_valid(&self) -> bool {
        !self.invalid
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn fail(&mut self) -> bool {
        self.invalid = true;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_chunks(input: &[u8], chunk_size: usize) -> Utf8Validator {
        let mut validator = Utf8Validator::new();
        for chunk in input.chunks(chunk_size) {
            if !validator.feed(chunk) {
                break;
            }
        }
        validator
    }

    #[test]
    fn test_valid_in_any_chunking() {
        let text = "Hello, Ёжик! 你好 🦀 done".as_bytes();
        for chunk_size in 1..=text.len() {
            let validator = feed_chunks(text, chunk_size);
            assert!(validator.is_complete(), "chunk size {chunk_size}");
        }
    }

    #[test]
    fn test_split_two_byte_code_point() {
        // "Ё" is 0xD0 0x81
        let mut validator = Utf8Validator::new();
        assert!(validator.feed(&[0xD0]));
        assert!(!validator.is_complete());
        assert!(validator.feed(&[0x81]));
        assert!(validator.is_complete());
    }

    #[test]
    fn test_truncated_code_point_is_incomplete() {
        let mut validator = Utf8Validator::new();
        assert!(validator.feed(&[b'a', 0xF0, 0x9F]));
        assert!(validator.is_valid());
        assert!(!validator.is_complete());
    }

    #[test]
    fn test_invalid_fails_fast() {
        let mut validator = Utf8Validator::new();
        assert!(!validator.feed(&[b'a', 0xC0, 0x80]));
        assert!(!validator.is_valid());
        // stays invalid
        assert!(!validator.feed(b"valid"));
    }

    #[test]
    fn test_invalid_continuation_across_chunks() {
        let mut validator = Utf8Validator::new();
        assert!(validator.feed(&[0xE2, 0x82]));
        assert!(!validator.feed(&[b'x']));
    }

    #[test]
    fn test_surrogates_are_invalid() {
        // U+D800 encoded as 0xED 0xA0 0x80
        let validator = feed_chunks(&[0xED, 0xA0, 0x80], 1);
        assert!(!validator.is_valid());
    }

    #[test]
    fn test_reset() {
        let mut validator = Utf8Validator::new();
        assert!(!validator.feed(&[0xFF]));
        validator.reset();
        assert!(validator.feed(b"ok"));
        assert!(validator.is_complete());
    }

    #[test]
    fn test_validate() {
        assert_eq!(validate(b"bye"), Some("bye"));
        assert_eq!(validate(&[0xC3]), None);
    }
}
