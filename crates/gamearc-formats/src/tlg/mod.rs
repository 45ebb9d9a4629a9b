//! TLG image decoding
//!
//! Three signatures are recognized. `TLG5.0` and `TLG6.0` carry the pixel
//! data; `TLG0.0 sds` wraps either of them with a length prefix and is
//! followed by tagged metadata chunks, which are ignored here. Output is
//! always a top-down [`PixelBuffer`] in [`PixelFormat::Bgra32`](crate::pixel::PixelFormat::Bgra32).

pub(crate) mod golomb;
pub mod tlg5;
pub mod tlg6;

pub use tlg5::Tlg5Header;
pub use tlg6::Tlg6Header;

use tracing::debug;

use crate::config::DecodeLimits;
use crate::error::{DecodeError, DecodeResult};
use crate::input::ByteInput;
use crate::pixel::PixelBuffer;

/// Signature of the TLG0 container
pub const TLG0_MAGIC: [u8; 11] = *b"TLG0.0\0sds\x1a";

const MAGIC_LENGTH: usize = 11;

/// Stream kind identified from the first eleven bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlgVersion {
    /// Container around a TLG5 or TLG6 stream
    Tlg0,
    /// Slide compressed planes
    Tlg5,
    /// Golomb coded chroma-predictive blocks
    Tlg6,
}

impl TlgVersion {
    /// Identify `data`, or report the signature found instead
    pub fn detect(data: &[u8]) -> DecodeResult<Self> {
        let Some(magic) = data.get(..MAGIC_LENGTH) else {
            return Err(DecodeError::truncated(MAGIC_LENGTH, data.len()));
        };
        match magic {
            m if m == TLG0_MAGIC => Ok(Self::Tlg0),
            m if m == tlg5::TLG5_MAGIC => Ok(Self::Tlg5),
            m if m == tlg6::TLG6_MAGIC => Ok(Self::Tlg6),
            other => Err(DecodeError::InvalidSignature {
                expected: tlg6::TLG6_MAGIC.to_vec(),
                actual: other.to_vec(),
            }),
        }
    }
}

/// Decode a TLG0, TLG5 or TLG6 image
pub fn decode_tlg(data: &[u8]) -> DecodeResult<PixelBuffer> {
    decode_tlg_with_limits(data, &DecodeLimits::default())
}

/// [`decode_tlg`] with explicit limits
pub fn decode_tlg_with_limits(data: &[u8], limits: &DecodeLimits) -> DecodeResult<PixelBuffer> {
    match TlgVersion::detect(data)? {
        TlgVersion::Tlg0 => {
            let mut input = ByteInput::at(data, MAGIC_LENGTH);
            let length = input.u32_le()? as usize;
            let inner = input.take(length)?;
            debug!(length, trailing = input.remaining(), "Unwrapped TLG0 container");
            match TlgVersion::detect(inner)? {
                TlgVersion::Tlg0 => Err(DecodeError::Format("nested TLG0 container".to_string())),
                TlgVersion::Tlg5 => tlg5::decode(inner, limits),
                TlgVersion::Tlg6 => tlg6::decode(inner, limits),
            }
        }
        TlgVersion::Tlg5 => tlg5::decode(data, limits),
        TlgVersion::Tlg6 => tlg6::decode(data, limits),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn small_tlg6() -> (Vec<u8>, Vec<u32>) {
        let pixels: Vec<u32> = (0..30u32).map(|i| 0xFF00_0000 | (i * 0x0003_0507)).collect();
        (tlg6::encoder::encode(3, 6, 5, &pixels, |_, _| 0), pixels)
    }

    #[test]
    fn test_detect() {
        assert_eq!(
            TlgVersion::detect(b"TLG5.0\0raw\x1a...").expect("Test operation should succeed"),
            TlgVersion::Tlg5
        );
        let err = TlgVersion::detect(b"TLG7.0\0raw\x1a").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidSignature { .. }));
        assert_eq!(
            TlgVersion::detect(b"TLG").unwrap_err().kind(),
            ErrorKind::TruncatedInput
        );
    }

    #[test]
    fn test_tlg0_wrapper() {
        let (inner, pixels) = small_tlg6();
        let mut data = TLG0_MAGIC.to_vec();
        data.extend((inner.len() as u32).to_le_bytes());
        data.extend(&inner);
        // Trailing tag chunk
        data.extend(b"tags");
        data.extend(5u32.to_le_bytes());
        data.extend(b"1:a=b");

        let image = decode_tlg(&data).expect("Test operation should succeed");
        assert_eq!(image.argb(5, 4), pixels[29]);
        assert_eq!(image, decode_tlg(&inner).expect("Test operation should succeed"));
    }

    #[test]
    fn test_tlg0_rejections() {
        let (inner, _) = small_tlg6();
        let mut data = TLG0_MAGIC.to_vec();
        data.extend((inner.len() as u32 + 1).to_le_bytes());
        data.extend(&inner);
        assert_eq!(decode_tlg(&data).unwrap_err().kind(), ErrorKind::TruncatedInput);

        let mut nested = TLG0_MAGIC.to_vec();
        nested.extend(15u32.to_le_bytes());
        nested.extend(TLG0_MAGIC);
        nested.extend(0u32.to_le_bytes());
        assert_eq!(decode_tlg(&nested).unwrap_err().kind(), ErrorKind::Format);
    }
}
