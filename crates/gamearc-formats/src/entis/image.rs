//! Block transform image restore
//!
//! The image is cut into square blocks of `2^block_degree` pixels a side,
//! each coded channel by channel. Lossless blocks carry wrapping 8-bit
//! residuals that go through an arrangement permutation, a color operation
//! and horizontal and vertical running sums. Lossy blocks carry quantized
//! frequency coefficients that are inverted with the shared transform math.

use tracing::{debug, trace};

use super::Transformation;
use super::context::{Architecture, SymbolContext};
use super::math::{
    GivensRotations, QuantumTable, check_degree, fast_ilot, fast_iplot, inverse_line, round_to_u8,
};
use crate::bits::BitSource;
use crate::config::DecodeLimits;
use crate::error::{DecodeError, DecodeResult};
use crate::pixel::{PixelBuffer, PixelFormat};

/// Largest block degree of image streams
pub const MAX_IMAGE_DEGREE: u32 = 8;

/// `(target, source)` channel additions of each color operation, applied in order
const COLOR_OPERATIONS: [&[(usize, usize)]; 16] = [
    &[],
    &[],
    &[],
    &[],
    &[],
    &[(1, 0)],
    &[(2, 0)],
    &[(1, 0), (2, 0)],
    &[],
    &[(0, 1)],
    &[(2, 1)],
    &[(0, 1), (2, 1)],
    &[],
    &[(0, 2)],
    &[(1, 2)],
    &[(0, 2), (1, 2)],
];

/// Geometry and coding of one image stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockTransformParams {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels; positive when the stream is stored bottom-up
    pub height: i32,
    /// Output bits per pixel
    pub bpp: u32,
    /// Block side as a power of two
    pub block_degree: u32,
    /// Coded channels
    pub channel_count: u32,
    /// Entropy coding of the residuals
    pub architecture: Architecture,
    /// Lossless or lossy transform
    pub transformation: Transformation,
}

impl BlockTransformParams {
    /// Pixel layout of the decoded buffer
    pub fn output_format(&self) -> DecodeResult<PixelFormat> {
        match (self.bpp, self.channel_count) {
            (8, 1) => Ok(PixelFormat::Gray8),
            (16, 3) => Ok(PixelFormat::Bgr555),
            (24, 3) => Ok(PixelFormat::Bgr24),
            (32, 3) | (32, 4) => Ok(PixelFormat::Bgra32),
            (bpp, channels) => Err(DecodeError::unsupported(format!(
                "{bpp} bpp image with {channels} channels"
            ))),
        }
    }

    fn bottom_up(&self) -> bool {
        self.height > 0
    }
}

/// Per-block pipeline selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Opcode {
    color: usize,
    arrange: usize,
    horizontal: bool,
}

impl Opcode {
    const IDENTITY: Self = Self {
        color: 0,
        arrange: 0,
        horizontal: false,
    };

    fn parse(code: u32) -> DecodeResult<Self> {
        let difference = (code >> 6) & 0x3;
        if difference > 1 {
            return Err(DecodeError::Format(format!(
                "unknown difference mode in opcode {code:#04x}"
            )));
        }
        Ok(Self {
            color: (code & 0xF) as usize,
            arrange: ((code >> 4) & 0x3) as usize,
            horizontal: difference == 1,
        })
    }
}

/// For each arrangement, the channel-major index of every coded symbol
fn arrange_tables(channels: usize, side: usize) -> [Vec<usize>; 4] {
    let area = side * side;
    let mut tables = [
        vec![0; channels * area],
        vec![0; channels * area],
        vec![0; channels * area],
        vec![0; channels * area],
    ];
    for c in 0..channels {
        for y in 0..side {
            for x in 0..side {
                let target = c * area + y * side + x;
                tables[0][target] = target;
                tables[1][(y * side + x) * channels + c] = target;
                tables[2][c * area + x * side + y] = target;
                tables[3][(x * side + y) * channels + c] = target;
            }
        }
    }
    tables
}

fn apply_color_operation(code: usize, block: &mut [i8], channels: usize, area: usize) -> DecodeResult<()> {
    let steps = COLOR_OPERATIONS[code];
    if steps.is_empty() {
        return Ok(());
    }
    if channels < 3 {
        return Err(DecodeError::Format(format!(
            "color operation {code:04b} on {channels} channels"
        )));
    }
    for &(target, source) in steps {
        for k in 0..area {
            block[target * area + k] = block[target * area + k].wrapping_add(block[source * area + k]);
        }
    }
    Ok(())
}

/// Channel planes padded to whole blocks, in stream row order
struct Planes {
    width: usize,
    height: usize,
    channels: usize,
    samples: Vec<u8>,
}

impl Planes {
    fn index(&self, channel: usize, x: usize, y: usize) -> usize {
        (channel * self.height + y) * self.width + x
    }

    fn block_columns(&self, side: usize) -> usize {
        self.width / side
    }

    fn block_rows(&self, side: usize) -> usize {
        self.height / side
    }

    fn store(&self, params: &BlockTransformParams, format: PixelFormat) -> PixelBuffer {
        let height = params.height.unsigned_abs();
        let mut out = PixelBuffer::new(params.width, height, format);
        for y in 0..height {
            let stream_y = (if params.bottom_up() { height - 1 - y } else { y }) as usize;
            let row = out.row_mut(y);
            for x in 0..params.width as usize {
                let s = |channel: usize| self.samples[self.index(channel, x, stream_y)];
                match format {
                    PixelFormat::Gray8 => row[x] = s(0),
                    PixelFormat::Bgr555 => {
                        let packed = (u16::from(s(2) & 0x1F) << 10)
                            | (u16::from(s(1) & 0x1F) << 5)
                            | u16::from(s(0) & 0x1F);
                        row[x * 2..x * 2 + 2].copy_from_slice(&packed.to_le_bytes());
                    }
                    PixelFormat::Bgr24 => row[x * 3..x * 3 + 3].copy_from_slice(&[s(0), s(1), s(2)]),
                    PixelFormat::Bgra32 => {
                        let alpha = if self.channels == 4 { s(3) } else { 0xFF };
                        row[x * 4..x * 4 + 4].copy_from_slice(&[s(0), s(1), s(2), alpha]);
                    }
                }
            }
        }
        out
    }
}

/// Decode one image stream
pub fn decode_block_transform(
    params: &BlockTransformParams,
    source: &mut dyn BitSource,
) -> DecodeResult<PixelBuffer> {
    decode_block_transform_with_limits(params, source, &DecodeLimits::default())
}

/// [`decode_block_transform`] with explicit limits
pub fn decode_block_transform_with_limits(
    params: &BlockTransformParams,
    source: &mut dyn BitSource,
    limits: &DecodeLimits,
) -> DecodeResult<PixelBuffer> {
    let format = params.output_format()?;
    let height = params.height.unsigned_abs();
    limits.check_image(params.width, height, format.bytes_per_pixel() as u32)?;
    let side = check_degree(params.block_degree, MAX_IMAGE_DEGREE)?;
    if format == PixelFormat::Bgr555 && params.transformation != Transformation::Lossless {
        return Err(DecodeError::unsupported("lossy 16 bpp image"));
    }

    let channels = params.channel_count as usize;
    let padded_width = (params.width as usize).div_ceil(side) * side;
    let padded_height = (height as usize).div_ceil(side) * side;
    let size = limits.check_output((padded_width * padded_height * channels) as u64)?;
    let mut planes = Planes {
        width: padded_width,
        height: padded_height,
        channels,
        samples: vec![0; size],
    };
    debug!(
        width = params.width,
        height = params.height,
        bpp = params.bpp,
        side,
        architecture = ?params.architecture,
        transformation = ?params.transformation,
        "Decoding block transform image"
    );

    match params.transformation {
        Transformation::Lossless => decode_lossless(params, source, side, &mut planes)?,
        Transformation::Dct => decode_lossy(params, source, side, false, &mut planes)?,
        Transformation::Lot => decode_lossy(params, source, side, true, &mut planes)?,
    }
    Ok(planes.store(params, format))
}

fn decode_lossless(
    params: &BlockTransformParams,
    source: &mut dyn BitSource,
    side: usize,
    planes: &mut Planes,
) -> DecodeResult<()> {
    let channels = planes.channels;
    let area = side * side;
    let mut context = SymbolContext::prepare(params.architecture, source)?;
    let per_block = source.get_bit()? == 1;
    let mut opcode = if per_block {
        Opcode::IDENTITY
    } else {
        Opcode::parse(source.get_bits(8)?)?
    };

    let tables = arrange_tables(channels, side);
    let mut symbols = vec![0i32; channels * area];
    let mut block = vec![0i8; channels * area];
    let mut lines = vec![0i8; channels * planes.width];
    let mut columns = vec![0i8; channels * side];

    for by in 0..planes.block_rows(side) {
        columns.fill(0);
        for bx in 0..planes.block_columns(side) {
            if per_block {
                opcode = Opcode::parse(source.get_bits(8)?)?;
            }
            context.decode_symbols(source, &mut symbols)?;
            for (&target, &symbol) in tables[opcode.arrange].iter().zip(&symbols) {
                block[target] = symbol as i8;
            }
            apply_color_operation(opcode.color, &mut block, channels, area)?;

            for c in 0..channels {
                let samples = &mut block[c * area..(c + 1) * area];
                for (row, carry) in samples
                    .chunks_exact_mut(side)
                    .zip(&mut columns[c * side..(c + 1) * side])
                {
                    if opcode.horizontal {
                        for value in row.iter_mut() {
                            *carry = carry.wrapping_add(*value);
                            *value = *carry;
                        }
                    } else {
                        *carry = row[side - 1];
                    }
                }
                let start = c * planes.width + bx * side;
                let above = &mut lines[start..start + side];
                for row in samples.chunks_exact_mut(side) {
                    for (value, above) in row.iter_mut().zip(above.iter_mut()) {
                        *value = value.wrapping_add(*above);
                        *above = *value;
                    }
                }
                for (y, row) in samples.chunks_exact(side).enumerate() {
                    let at = planes.index(c, bx * side, by * side + y);
                    for (sample, &value) in planes.samples[at..at + side].iter_mut().zip(row) {
                        *sample = value as u8;
                    }
                }
            }
            trace!(bx, by, ?opcode, "Restored lossless block");
        }
    }
    Ok(())
}

fn decode_lossy(
    params: &BlockTransformParams,
    source: &mut dyn BitSource,
    side: usize,
    lapped: bool,
    planes: &mut Planes,
) -> DecodeResult<()> {
    let channels = planes.channels;
    let area = side * side;
    let half = side / 2;
    let mut context = SymbolContext::prepare(params.architecture, source)?;
    let weight_code = source.get_bits(32)?;
    let coefficient = source.get_bits(16)? as u16;
    let table = QuantumTable::new(side, weight_code, coefficient);
    let rotations = GivensRotations::new(side);
    debug!(weight_code, coefficient, lapped, "Read lossy image quantizer");

    let mut symbols = vec![0i32; area];
    let mut values = vec![0.0f64; area];
    let mut column = vec![0.0f64; side];
    let mut carry = vec![0.0f64; channels * side * half];

    for by in 0..planes.block_rows(side) {
        carry.fill(0.0);
        for bx in 0..planes.block_columns(side) {
            for c in 0..channels {
                context.decode_symbols(source, &mut symbols)?;
                table.dequantize_square(&symbols, &mut values);
                for row in values.chunks_exact_mut(side) {
                    inverse_line(&rotations, row);
                }
                for x in 0..side {
                    for (y, value) in column.iter_mut().enumerate() {
                        *value = values[y * side + x];
                    }
                    inverse_line(&rotations, &mut column);
                    for (y, &value) in column.iter().enumerate() {
                        values[y * side + x] = value;
                    }
                }
                if lapped {
                    for (y, row) in values.chunks_exact_mut(side).enumerate() {
                        fast_iplot(row);
                        let start = (c * side + y) * half;
                        fast_ilot(&mut carry[start..start + half], row);
                    }
                }
                for (y, row) in values.chunks_exact(side).enumerate() {
                    let at = planes.index(c, bx * side, by * side + y);
                    for (sample, &value) in planes.samples[at..at + side].iter_mut().zip(row) {
                        *sample = round_to_u8(value + 128.0);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Lossless encoder producing streams [`decode_block_transform`] reads back
#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) mod encoder {
    use super::*;
    use crate::bits::BitWriter;
    use crate::entis::context::encoder::ContextEncoder;

    /// `image` holds one top-down plane per channel
    pub(crate) fn encode_lossless(
        params: &BlockTransformParams,
        image: &[Vec<u8>],
        per_block: bool,
        opcodes: &[u8],
        context_trees: bool,
    ) -> Vec<u8> {
        let side = 1usize << params.block_degree;
        let area = side * side;
        let channels = params.channel_count as usize;
        let (width, height) = (params.width as usize, params.height.unsigned_abs() as usize);
        let (padded_width, padded_height) = (width.div_ceil(side) * side, height.div_ceil(side) * side);

        let mut planes = vec![vec![0i8; padded_width * padded_height]; channels];
        for (plane, pixels) in planes.iter_mut().zip(image) {
            for y in 0..height {
                let stream_y = if params.bottom_up() { height - 1 - y } else { y };
                for x in 0..width {
                    plane[stream_y * padded_width + x] = pixels[y * width + x] as i8;
                }
            }
        }
        let vertical: Vec<Vec<i8>> = planes
            .iter()
            .map(|plane| {
                (0..plane.len())
                    .map(|i| {
                        let above = if i < padded_width { 0 } else { plane[i - padded_width] };
                        plane[i].wrapping_sub(above)
                    })
                    .collect()
            })
            .collect();

        let tables = arrange_tables(channels, side);
        let mut symbols = Vec::new();
        let mut block_opcodes = Vec::new();
        for by in 0..padded_height / side {
            for bx in 0..padded_width / side {
                let code = if per_block {
                    opcodes[block_opcodes.len() % opcodes.len()]
                } else {
                    opcodes[0]
                };
                let opcode = Opcode::parse(u32::from(code)).expect("Test operation should succeed");
                let mut block = vec![0i8; channels * area];
                for c in 0..channels {
                    for y in 0..side {
                        for x in 0..side {
                            let (px, py) = (bx * side + x, by * side + y);
                            let value = vertical[c][py * padded_width + px];
                            let left = if px == 0 { 0 } else { vertical[c][py * padded_width + px - 1] };
                            block[c * area + y * side + x] =
                                if opcode.horizontal { value.wrapping_sub(left) } else { value };
                        }
                    }
                }
                for &(target, source) in COLOR_OPERATIONS[opcode.color].iter().rev() {
                    for k in 0..area {
                        block[target * area + k] = block[target * area + k].wrapping_sub(block[source * area + k]);
                    }
                }
                symbols.extend(tables[opcode.arrange].iter().map(|&i| i32::from(block[i])));
                block_opcodes.push(code);
            }
        }

        let mut encoder = ContextEncoder::new(params.architecture, symbols, context_trees);
        let mut writer = BitWriter::new();
        encoder.prepare(&mut writer);
        writer.put_bit(u32::from(per_block));
        if !per_block {
            writer.put_bits(u32::from(opcodes[0]), 8);
        }
        for code in block_opcodes {
            if per_block {
                writer.put_bits(u32::from(code), 8);
            }
            encoder.encode(&mut writer, channels * area);
        }
        writer.finish()
    }
}
