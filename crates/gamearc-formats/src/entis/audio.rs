//! MIO sound restore
//!
//! Samples are coded in blocks of `2^subband_degree` per channel. Every
//! block carries its own weight code and coefficient followed by the
//! quantized spectrum; channels are coded independently and interleaved on
//! output.

use tracing::{debug, trace};

use super::Transformation;
use super::context::{Architecture, SymbolContext};
use super::header::SoundInfo;
use super::math::{
    GivensRotations, MAX_DEGREE, QuantumTable, check_degree, fast_ilot, fast_iplot, inverse_line,
    round_to_i16,
};
use crate::bits::BitSource;
use crate::config::DecodeLimits;
use crate::error::{DecodeError, DecodeResult};
use crate::pixel::SampleBuffer;

/// Decode a `SoundStm` bit stream described by `info`
pub fn decode_sound(
    info: &SoundInfo,
    source: &mut dyn BitSource,
    limits: &DecodeLimits,
) -> DecodeResult<SampleBuffer> {
    let lapped = match Transformation::from_code(info.transformation)? {
        Transformation::Lossless => return Err(DecodeError::unsupported("lossless PCM sound")),
        Transformation::Dct => false,
        Transformation::Lot => true,
    };
    let architecture = Architecture::from_code(info.architecture)?;
    if !(1..=2).contains(&info.channel_count) {
        return Err(DecodeError::Format(format!(
            "sound with {} channels",
            info.channel_count
        )));
    }
    if info.bits_per_sample != u32::from(SampleBuffer::BITS_PER_SAMPLE) {
        return Err(DecodeError::unsupported(format!(
            "{} bit sound",
            info.bits_per_sample
        )));
    }
    let length = check_degree(info.subband_degree, MAX_DEGREE)?;
    let channels = info.channel_count as usize;
    let total = info.all_sample_count as usize;
    let bytes = u64::from(info.all_sample_count) * u64::from(info.channel_count) * 2;
    let size = limits.check_output(bytes)? / 2;
    debug!(
        channels,
        total,
        length,
        lapped,
        sample_rate = info.samples_per_sec,
        "Decoding MIO sound"
    );

    let mut samples = vec![0i16; size];
    if total == 0 {
        return Ok(SampleBuffer {
            channels: channels as u16,
            sample_rate: info.samples_per_sec,
            samples,
        });
    }

    let mut context = SymbolContext::prepare(architecture, source)?;
    let rotations = GivensRotations::new(length);
    let mut symbols = vec![0i32; length];
    let mut values = vec![0.0f64; length];
    let mut carries = vec![vec![0.0f64; length / 2]; channels];

    for start in (0..total).step_by(length) {
        let count = length.min(total - start);
        for (c, carry) in carries.iter_mut().enumerate() {
            let weight_code = source.get_bits(32)?;
            let coefficient = source.get_bits(16)? as u16;
            context.decode_symbols(source, &mut symbols)?;
            QuantumTable::new(length, weight_code, coefficient).dequantize(&symbols, &mut values);
            inverse_line(&rotations, &mut values);
            if lapped {
                fast_iplot(&mut values);
                fast_ilot(carry, &mut values);
            }
            for (i, &value) in values[..count].iter().enumerate() {
                samples[(start + i) * channels + c] = round_to_i16(value);
            }
        }
        trace!(start, count, "Restored sound block");
    }

    Ok(SampleBuffer {
        channels: channels as u16,
        sample_rate: info.samples_per_sec,
        samples,
    })
}
