//! TLG slide compression
//!
//! A 4096-byte text buffer persists across every call on one
//! [`SlideDecoder`], together with its write position, so consecutive
//! blocks of an image can refer back into earlier blocks. Flag bytes are
//! read least significant bit first; a set bit is a match `b0 b1` at
//! `b0 | (b1 & 0x0F) << 8` of length `(b1 >> 4) + 3`, extended by one more
//! byte when that reaches 18.

use super::RingWindow;
use crate::error::DecodeResult;
use crate::input::ByteInput;

/// Size of the slide text buffer
pub const TEXT_SIZE: usize = 4096;
const MIN_MATCH: usize = 3;
const LONG_MATCH: usize = 18;

/// Slide decompressor with its persistent text buffer
#[derive(Debug, Clone)]
pub struct SlideDecoder {
    window: RingWindow,
}

impl Default for SlideDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlideDecoder {
    /// Zeroed text, writing from position 0
    pub fn new() -> Self {
        Self {
            window: RingWindow::new(TEXT_SIZE, 0, 0),
        }
    }

    /// Text seeded with the pattern used by TLG6 filter type tables
    ///
    /// For every `i` in `0..32` and `j` in `0..16` the text holds four bytes
    /// of `i` followed by four bytes of `j`.
    pub fn with_filter_text() -> Self {
        let mut text = Vec::with_capacity(TEXT_SIZE);
        for i in 0..32u8 {
            for j in 0..16u8 {
                text.extend([i; 4]);
                text.extend([j; 4]);
            }
        }
        Self {
            window: RingWindow::with_text(text, 0),
        }
    }

    /// Current write position in the text
    pub fn position(&self) -> usize {
        self.window.position()
    }

    /// Decode `input` until `expected_size` bytes are produced
    pub fn decompress(&mut self, input: &[u8], expected_size: usize) -> DecodeResult<Vec<u8>> {
        let mut out = Vec::with_capacity(expected_size);
        self.decompress_into(input, &mut out, expected_size)?;
        Ok(out)
    }

    /// Append decoded bytes to `out` until it holds `limit` bytes
    pub fn decompress_into(&mut self, input: &[u8], out: &mut Vec<u8>, limit: usize) -> DecodeResult<()> {
        let mut input = ByteInput::new(input);
        let mut flags = 0u32;
        while out.len() < limit {
            flags >>= 1;
            if flags & 0x100 == 0 {
                flags = u32::from(input.u8()?) | 0xFF00;
            }
            if flags & 1 != 0 {
                let [b0, b1] = input.pair()?;
                let from = usize::from(b0) | (usize::from(b1 & 0x0F) << 8);
                let mut length = usize::from(b1 >> 4) + MIN_MATCH;
                if length == LONG_MATCH {
                    length += usize::from(input.u8()?);
                }
                self.window.copy(from, length, out, limit);
            } else {
                let byte = input.u8()?;
                out.push(byte);
                self.window.push(byte);
            }
        }
        Ok(())
    }

    /// Encode `data` against the current text, advancing it like the decoder
    #[cfg(test)]
    pub(crate) fn compress(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut sink = Vec::new();
        let mut flag_at = 0;
        let mut token = 0;
        let mut pos = 0;
        while pos < data.len() {
            if token % 8 == 0 {
                flag_at = out.len();
                out.push(0);
            }
            let (from, length) = self.window.longest_match(&data[pos..], LONG_MATCH + 255);
            if length >= MIN_MATCH {
                out[flag_at] |= 1 << (token % 8);
                let code = (length - MIN_MATCH).min(0x0F);
                out.push(from as u8);
                out.push(((from >> 8) as u8 & 0x0F) | ((code as u8) << 4));
                if length >= LONG_MATCH {
                    out.push((length - LONG_MATCH) as u8);
                }
                self.window.copy(from, length, &mut sink, usize::MAX);
                pos += length;
            } else {
                out.push(data[pos]);
                self.window.push(data[pos]);
                pos += 1;
            }
            token += 1;
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_long_match_extension() {
        // Literal 7, then a match from 0 of 18 + 2 bytes.
        let input = [0b10, 7, 0x00, 0xF0, 2];
        let out = SlideDecoder::new()
            .decompress(&input, 21)
            .expect("Test operation should succeed");
        assert_eq!(out, vec![7; 21]);
    }

    #[test]
    fn test_filter_text_seed() {
        let mut decoder = SlideDecoder::with_filter_text();
        // Match of 8 bytes from offset 8 * 17: i = 1, j = 1.
        let input = [0b1, 136, 0x50];
        let out = decoder.decompress(&input, 8).expect("Test operation should succeed");
        assert_eq!(out, vec![1, 1, 1, 1, 1, 1, 1, 1]);
        assert_eq!(decoder.position(), 8);
    }

    #[test]
    fn test_text_persists_across_calls() {
        let first = b"persistent text buffer";
        let second = b"text buffer persistent";
        let mut encoder = SlideDecoder::new();
        let packed_first = encoder.compress(first);
        let packed_second = encoder.compress(second);

        let mut decoder = SlideDecoder::new();
        let out = decoder
            .decompress(&packed_first, first.len())
            .expect("Test operation should succeed");
        assert_eq!(out, first.to_vec());
        let out = decoder
            .decompress(&packed_second, second.len())
            .expect("Test operation should succeed");
        assert_eq!(out, second.to_vec());
        assert!(packed_second.len() < second.len());
    }

    #[test]
    fn test_truncated_match() {
        let err = SlideDecoder::new().decompress(&[0x01, 0x00], 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedInput);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn slide_round_trip(data in prop::collection::vec(0u8..4, 0..400)) {
                let packed = SlideDecoder::new().compress(&data);
                let out = SlideDecoder::new()
                    .decompress(&packed, data.len())
                    .expect("Test operation should succeed");
                prop_assert_eq!(out, data);
            }
        }
    }
}
