//! LZSS decompressors
//!
//! Every variant is a single forward pass that stops once `expected_size`
//! bytes have been produced. Matches may overlap the bytes they produce, so
//! copies always run one byte at a time. Two addressing styles exist:
//!
//! - ring window variants ([`LzssVariant::OnScripter`],
//!   [`LzssVariant::Tlg5`], [`LzssVariant::Okumura`]) address an absolute
//!   position in a pre-seeded text buffer that every output byte is also
//!   written to
//! - back-reference variants ([`LzssVariant::Pt1`], [`LzssVariant::Wbm`])
//!   address a distance behind the current end of the output

pub mod okumura;
pub mod onscripter;
pub mod pt1;
pub mod slide;
pub mod wbm;

pub use okumura::OkumuraParams;
pub use slide::SlideDecoder;

use tracing::debug;

use crate::config::DecodeLimits;
use crate::error::{DecodeError, DecodeResult};

/// LZSS flavor selector for [`decompress_lzss`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LzssVariant {
    /// NSA/SAR archives: MSB-first bit stream, 256-byte window
    OnScripter,
    /// 16-bit little-endian control words, 12-bit distances
    Pt1,
    /// Flag bytes with big-endian 16-bit references
    Wbm,
    /// TLG5 slide coding over a zeroed 4096-byte window
    Tlg5,
    /// Classic flag-byte LZSS with configurable window
    Okumura(OkumuraParams),
}

impl LzssVariant {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::OnScripter => "onscripter",
            Self::Pt1 => "pt1",
            Self::Wbm => "wbm",
            Self::Tlg5 => "tlg5",
            Self::Okumura(_) => "okumura",
        }
    }
}

/// Decompress `compressed` into exactly `expected_size` bytes
pub fn decompress_lzss(
    variant: LzssVariant,
    compressed: &[u8],
    expected_size: usize,
) -> DecodeResult<Vec<u8>> {
    decompress_lzss_with_limits(variant, compressed, expected_size, &DecodeLimits::default())
}

/// [`decompress_lzss`] with explicit limits
pub fn decompress_lzss_with_limits(
    variant: LzssVariant,
    compressed: &[u8],
    expected_size: usize,
    limits: &DecodeLimits,
) -> DecodeResult<Vec<u8>> {
    if expected_size == 0 {
        return Ok(Vec::new());
    }
    limits.check_output(expected_size as u64)?;

    let output = match variant {
        LzssVariant::OnScripter => onscripter::decompress(compressed, expected_size)?,
        LzssVariant::Pt1 => pt1::decompress(compressed, expected_size)?,
        LzssVariant::Wbm => wbm::decompress(compressed, expected_size)?,
        LzssVariant::Tlg5 => SlideDecoder::new().decompress(compressed, expected_size)?,
        LzssVariant::Okumura(params) => okumura::decompress(&params, compressed, expected_size)?,
    };
    debug!(
        variant = variant.name(),
        input = compressed.len(),
        output = output.len(),
        "Decompressed LZSS stream"
    );
    Ok(output)
}

/// Circular text buffer shared by the ring window variants
#[derive(Debug, Clone)]
pub(crate) struct RingWindow {
    text: Vec<u8>,
    mask: usize,
    pos: usize,
}

impl RingWindow {
    /// `size` must be a power of two
    pub(crate) fn new(size: usize, fill: u8, pos: usize) -> Self {
        Self::with_text(vec![fill; size], pos)
    }

    pub(crate) fn with_text(text: Vec<u8>, pos: usize) -> Self {
        let mask = text.len() - 1;
        Self {
            text,
            mask,
            pos: pos & mask,
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn push(&mut self, byte: u8) {
        self.text[self.pos] = byte;
        self.pos = (self.pos + 1) & self.mask;
    }

    /// Copy `length` bytes starting at `from`, stopping at `limit` output bytes
    pub(crate) fn copy(&mut self, from: usize, length: usize, out: &mut Vec<u8>, limit: usize) {
        for k in 0..length {
            if out.len() >= limit {
                break;
            }
            let byte = self.text[(from + k) & self.mask];
            out.push(byte);
            self.push(byte);
        }
    }

    /// Longest match of `data` reachable from any window position
    ///
    /// Returns `(from, length)`; used by the reference encoders in tests.
    #[cfg(test)]
    pub(crate) fn longest_match(&self, data: &[u8], max_length: usize) -> (usize, usize) {
        let limit = max_length.min(data.len());
        let mut best = (0, 0);
        for from in 0..self.text.len() {
            let mut length = 0;
            while length < limit {
                let index = (from + length) & self.mask;
                let written = (index + self.text.len() - self.pos) & self.mask;
                // Bytes this copy already wrote shadow the old window contents.
                let byte = if written < length {
                    data[written]
                } else {
                    self.text[index]
                };
                if byte != data[length] {
                    break;
                }
                length += 1;
            }
            if length > best.1 {
                best = (from, length);
                if length == limit {
                    break;
                }
            }
        }
        best
    }
}

/// Append `length` bytes copied from `distance` bytes back
pub(crate) fn copy_back(
    out: &mut Vec<u8>,
    distance: usize,
    length: usize,
    limit: usize,
) -> DecodeResult<()> {
    if distance == 0 || distance > out.len() {
        return Err(DecodeError::Format(format!(
            "back reference of {distance} bytes with {} bytes written",
            out.len()
        )));
    }
    let start = out.len() - distance;
    for k in 0..length {
        if out.len() >= limit {
            break;
        }
        let byte = out[start + k];
        out.push(byte);
    }
    Ok(())
}

/// Longest earlier occurrence of `data[pos..]`, as `(distance, length)`
#[cfg(test)]
pub(crate) fn longest_back_match(
    data: &[u8],
    pos: usize,
    max_distance: usize,
    max_length: usize,
) -> (usize, usize) {
    let limit = max_length.min(data.len() - pos);
    let mut best = (0, 0);
    for distance in 1..=max_distance.min(pos) {
        let mut length = 0;
        while length < limit && data[pos + length - distance] == data[pos + length] {
            length += 1;
        }
        if length > best.1 {
            best = (distance, length);
        }
    }
    best
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_overlapping_back_copy() {
        let mut out = b"ab".to_vec();
        copy_back(&mut out, 2, 5, usize::MAX).expect("Test operation should succeed");
        assert_eq!(out, b"abababa".to_vec());

        let mut out = b"xyz".to_vec();
        copy_back(&mut out, 1, 10, 6).expect("Test operation should succeed");
        assert_eq!(out, b"xyzzzz".to_vec());
    }

    #[test]
    fn test_back_copy_rejects_bad_distance() {
        let mut out = b"abc".to_vec();
        assert_eq!(copy_back(&mut out, 4, 1, 10).unwrap_err().kind(), ErrorKind::Format);
        assert_eq!(copy_back(&mut out, 0, 1, 10).unwrap_err().kind(), ErrorKind::Format);
    }

    #[test]
    fn test_ring_copy_reads_its_own_output() {
        let mut window = RingWindow::new(16, 0, 0);
        window.push(b'q');
        let mut out = Vec::new();
        window.copy(0, 4, &mut out, usize::MAX);
        assert_eq!(out, b"qqqq".to_vec());
        assert_eq!(window.position(), 5);

        let (from, length) = window.longest_match(b"qqqqqqq", 7);
        assert_eq!(length, 7);
        assert!(from <= 4);
    }

    #[test]
    fn test_zero_size_reads_nothing() {
        for variant in [
            LzssVariant::OnScripter,
            LzssVariant::Pt1,
            LzssVariant::Wbm,
            LzssVariant::Tlg5,
            LzssVariant::Okumura(OkumuraParams::default()),
        ] {
            let out = decompress_lzss(variant, &[], 0).expect("Test operation should succeed");
            assert!(out.is_empty(), "{}", variant.name());
        }
    }

    #[test]
    fn test_empty_source_is_truncated() {
        for variant in [
            LzssVariant::OnScripter,
            LzssVariant::Pt1,
            LzssVariant::Wbm,
            LzssVariant::Tlg5,
            LzssVariant::Okumura(OkumuraParams::default()),
        ] {
            let err = decompress_lzss(variant, &[], 4).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TruncatedInput, "{}", variant.name());
        }
    }

    #[test]
    fn test_limits_apply_before_decoding() {
        let limits = DecodeLimits::new().with_max_output_bytes(8);
        let err = decompress_lzss_with_limits(LzssVariant::Pt1, &[], 9, &limits).unwrap_err();
        assert!(matches!(err, DecodeError::LimitExceeded { .. }));
    }
}
