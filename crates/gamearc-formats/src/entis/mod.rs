//! Entis ERI images and MIO sound
//!
//! Both formats share the Entis section container and the entropy coding
//! contexts. ERI images are restored by [`decode_block_transform`], either
//! losslessly through the block pipeline or through the lossy DCT and lapped
//! transforms that MIO sound uses as well. Mid/side stereo, Nemesis coding
//! and lossless PCM sound are recognized and reported as unsupported.

pub mod audio;
pub mod context;
pub mod header;
pub mod image;
pub mod math;

pub use context::Architecture;
pub use header::{EntisFile, EntisFileHeader, ImageInfo, SectionHeader, SoundInfo};
pub use image::{BlockTransformParams, decode_block_transform, decode_block_transform_with_limits};

use tracing::debug;

use crate::bits::BitReader;
use crate::config::DecodeLimits;
use crate::error::{DecodeError, DecodeResult};
use crate::pixel::{PixelBuffer, SampleBuffer};
use header::{TRANSFORM_DCT, TRANSFORM_LOSSLESS, TRANSFORM_LOT, TRANSFORM_LOT_MSS};

/// Transform applied to coded blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformation {
    /// Exact residual coding
    Lossless,
    /// Quantized DCT
    Dct,
    /// Quantized DCT with lapped block overlap
    Lot,
}

impl Transformation {
    /// Map a transformation code from an info record
    pub fn from_code(code: u32) -> DecodeResult<Self> {
        match code {
            TRANSFORM_LOSSLESS => Ok(Self::Lossless),
            TRANSFORM_DCT => Ok(Self::Dct),
            TRANSFORM_LOT => Ok(Self::Lot),
            TRANSFORM_LOT_MSS => Err(DecodeError::unsupported("Entis mid/side stereo transform")),
            other => Err(DecodeError::Format(format!(
                "unknown Entis transformation {other:#010x}"
            ))),
        }
    }
}

impl ImageInfo {
    /// Decoder parameters described by this record
    pub fn block_transform_params(&self) -> DecodeResult<BlockTransformParams> {
        let width = u32::try_from(self.width)
            .ok()
            .filter(|&w| w > 0)
            .ok_or_else(|| DecodeError::Format(format!("image width {}", self.width)))?;
        if self.height == 0 {
            return Err(DecodeError::Format("image height of zero".to_string()));
        }
        Ok(BlockTransformParams {
            width,
            height: self.height,
            bpp: self.bpp,
            block_degree: self.blocking_degree,
            channel_count: self.channel_count()?,
            architecture: Architecture::from_code(self.architecture)?,
            transformation: Transformation::from_code(self.transformation)?,
        })
    }
}

/// Decode the first frame of an ERI image
pub fn decode_eri(data: &[u8]) -> DecodeResult<PixelBuffer> {
    decode_eri_with_limits(data, &DecodeLimits::default())
}

/// [`decode_eri`] with explicit limits
pub fn decode_eri_with_limits(data: &[u8], limits: &DecodeLimits) -> DecodeResult<PixelBuffer> {
    let file = EntisFile::parse(data)?;
    let info = file
        .image_info
        .as_ref()
        .ok_or_else(|| DecodeError::Format("ERI file without ImageInf record".to_string()))?;
    let frame = file
        .image_frames
        .first()
        .ok_or_else(|| DecodeError::Format("ERI file without ImageFrm record".to_string()))?;
    let params = info.block_transform_params()?;
    debug!(
        frames = file.image_frames.len(),
        frame_bytes = frame.len(),
        "Decoding ERI image"
    );
    decode_block_transform_with_limits(&params, &mut BitReader::new(frame), limits)
}

/// Decode the sound stream of a MIO file
pub fn decode_mio(data: &[u8]) -> DecodeResult<SampleBuffer> {
    decode_mio_with_limits(data, &DecodeLimits::default())
}

/// [`decode_mio`] with explicit limits
pub fn decode_mio_with_limits(data: &[u8], limits: &DecodeLimits) -> DecodeResult<SampleBuffer> {
    let file = EntisFile::parse(data)?;
    let info = file
        .sound_info
        .as_ref()
        .ok_or_else(|| DecodeError::Format("MIO file without SoundInf record".to_string()))?;
    let stream = file
        .sound_streams
        .first()
        .ok_or_else(|| DecodeError::Format("MIO file without SoundStm record".to_string()))?;
    audio::decode_sound(info, &mut BitReader::new(stream), limits)
}
