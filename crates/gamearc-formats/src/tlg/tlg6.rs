//! TLG6 chroma-predictive images
//!
//! The image is cut into rows of 8-line blocks and each row into 8-pixel
//! wide blocks. Every block carries a filter type: bit 0 picks MED or
//! averaging prediction and the upper bits pick one of 16 channel
//! correlation formulas applied to the residual before it is added to the
//! prediction. Residuals for a block row are Golomb coded per channel and
//! stored block by block; even lines read a block row left to right, odd
//! lines right to left, and odd blocks store their rows bottom-up.

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};
use tracing::{debug, trace};

use super::golomb::{Placement, decode_golomb_values};
use crate::config::DecodeLimits;
use crate::error::{DecodeError, DecodeResult};
use crate::input::ByteInput;
use crate::lzss::SlideDecoder;
use crate::pixel::{PixelBuffer, PixelFormat};

/// Signature of a TLG6 stream
pub const TLG6_MAGIC: [u8; 11] = *b"TLG6.0\0raw\x1a";

const BLOCK_WIDTH: usize = 8;
const BLOCK_HEIGHT: usize = 8;
const CHROMA_FORMULAS: u8 = 16;

/// TLG6 stream header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct Tlg6Header {
    /// Signature, always `TLG6.0\0raw\x1a`
    #[br(assert(magic == TLG6_MAGIC, "Invalid TLG6 magic: {:?}", magic))]
    pub magic: [u8; 11],

    /// Channel count: 1, 3 or 4
    pub colors: u8,

    /// Reserved data flags
    pub data_flag: u8,

    /// Reserved color type
    pub color_type: u8,

    /// Nonzero when the stream ships its own Golomb table
    pub external_golomb_table: u8,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Largest per-channel bit stream in bits
    pub max_bit_length: u32,
}

impl Tlg6Header {
    /// Encoded header size in bytes
    pub const SIZE: usize = 27;

    /// Header for a plain image
    pub fn new(colors: u8, width: u32, height: u32, max_bit_length: u32) -> Self {
        Self {
            magic: TLG6_MAGIC,
            colors,
            data_flag: 0,
            color_type: 0,
            external_golomb_table: 0,
            width,
            height,
            max_bit_length,
        }
    }

    /// Check fields the decoder depends on
    pub fn validate(&self) -> DecodeResult<()> {
        if !matches!(self.colors, 1 | 3 | 4) {
            return Err(DecodeError::Format(format!(
                "TLG6 with {} color channels",
                self.colors
            )));
        }
        if self.external_golomb_table != 0 {
            return Err(DecodeError::unsupported("TLG6 external Golomb table"));
        }
        Ok(())
    }

    /// Blocks per block row
    pub fn x_block_count(&self) -> usize {
        (self.width as usize - 1) / BLOCK_WIDTH + 1
    }

    /// Block rows in the image
    pub fn y_block_count(&self) -> usize {
        (self.height as usize - 1) / BLOCK_HEIGHT + 1
    }
}

fn map_lanes(a: u32, b: u32, c: u32, f: impl Fn(u8, u8, u8) -> u8) -> u32 {
    let (a, b, c) = (a.to_le_bytes(), b.to_le_bytes(), c.to_le_bytes());
    u32::from_le_bytes([
        f(a[0], b[0], c[0]),
        f(a[1], b[1], c[1]),
        f(a[2], b[2], c[2]),
        f(a[3], b[3], c[3]),
    ])
}

/// Median edge detector on each byte lane
fn med(left: u32, above: u32, above_left: u32) -> u32 {
    map_lanes(left, above, above_left, |a, b, c| {
        let (lo, hi) = (a.min(b), a.max(b));
        if c > hi {
            lo
        } else if c < lo {
            hi
        } else {
            hi - c + lo
        }
    })
}

/// Rounded-up mean on each byte lane
fn average(left: u32, above: u32) -> u32 {
    map_lanes(left, above, 0, |a, b, _| ((u16::from(a) + u16::from(b) + 1) >> 1) as u8)
}

fn packed_add(a: u32, b: u32) -> u32 {
    map_lanes(a, b, 0, |x, y, _| x.wrapping_add(y))
}

fn sum(lanes: &[u8]) -> u8 {
    lanes.iter().fold(0u8, |acc, &v| acc.wrapping_add(v))
}

/// Apply correlation formula `chroma` to a buffered residual
fn chroma_residual(chroma: u8, residual: u32) -> u32 {
    let [ib, ig, ir, ia] = residual.to_le_bytes();
    let (b, g, r) = match chroma {
        0 => (ib, ig, ir),
        1 => (sum(&[ib, ig]), ig, sum(&[ir, ig])),
        2 => (ib, sum(&[ig, ib]), sum(&[ir, ib, ig])),
        3 => (sum(&[ib, ir, ig]), sum(&[ig, ir]), ir),
        4 => (sum(&[ib, ir]), sum(&[ig, ib, ir]), sum(&[ir, ib, ir, ig])),
        5 => (sum(&[ib, ir]), sum(&[ig, ib, ir]), ir),
        6 => (sum(&[ib, ig]), ig, ir),
        7 => (ib, sum(&[ig, ib]), ir),
        8 => (ib, ig, sum(&[ir, ig])),
        9 => (sum(&[ib, ig, ir, ib]), sum(&[ig, ir, ib]), sum(&[ir, ib])),
        10 => (sum(&[ib, ir]), sum(&[ig, ir]), ir),
        11 => (ib, sum(&[ig, ib]), sum(&[ir, ib])),
        12 => (ib, sum(&[ig, ir, ib]), sum(&[ir, ib])),
        13 => (sum(&[ib, ig]), sum(&[ig, ir, ib, ig]), sum(&[ir, ib, ig])),
        14 => (sum(&[ib, ig, ir]), sum(&[ig, ir]), sum(&[ir, ib, ig, ir])),
        _ => (ib, sum(&[ig, ib << 1]), sum(&[ir, ib << 1])),
    };
    u32::from_le_bytes([b, g, r, ia])
}

/// Per block row traversal state shared by both halves of a line
struct LineLayout<'a> {
    width: usize,
    filter_types: &'a [u8],
    residuals: &'a [u32],
    skip: usize,
    odd_skip: isize,
    forward: bool,
    initial: u32,
}

impl LineLayout<'_> {
    /// Reconstruct blocks `start_block..block_limit` of one line
    fn decode(
        &self,
        prev: &[u32],
        current: &mut [u32],
        start_block: usize,
        block_limit: usize,
        start: usize,
    ) -> DecodeResult<()> {
        let (mut p, mut up) = if start_block > 0 {
            let x = start_block * BLOCK_WIDTH - 1;
            (current[x], prev[x])
        } else {
            (self.initial, self.initial)
        };
        let skip = self.skip as isize;
        let step: isize = if self.forward { 1 } else { -1 };
        let mut index = (start + self.skip * start_block) as isize;

        for block in start_block..block_limit {
            let x0 = block * BLOCK_WIDTH;
            let w = (self.width - x0).min(BLOCK_WIDTH);
            let ww = w as isize;
            if !self.forward {
                index += ww - 1;
            }
            if block & 1 == 1 {
                index += self.odd_skip * ww;
            }

            let filter = self.filter_types[block];
            let chroma = filter >> 1;
            if chroma >= CHROMA_FORMULAS {
                return Err(DecodeError::Format(format!("TLG6 filter type {filter}")));
            }
            for x in x0..x0 + w {
                let residual = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.residuals.get(i))
                    .ok_or_else(|| {
                        DecodeError::Format(format!("TLG6 residual index {index} out of range"))
                    })?;
                let u = prev[x];
                let predicted = if filter & 1 == 0 {
                    med(p, u, up)
                } else {
                    average(p, u)
                };
                p = packed_add(predicted, chroma_residual(chroma, *residual));
                up = u;
                current[x] = p;
                index += step;
            }

            if self.forward {
                index += skip - ww;
            } else {
                index += skip + 1;
            }
            if block & 1 == 1 {
                index -= self.odd_skip * ww;
            }
        }
        Ok(())
    }
}

/// Decode a TLG6 stream into BGRA pixels
pub fn decode(data: &[u8], limits: &DecodeLimits) -> DecodeResult<PixelBuffer> {
    let mut cursor = Cursor::new(data);
    let header = Tlg6Header::read(&mut cursor)?;
    header.validate()?;
    limits.check_image(header.width, header.height, 4)?;
    debug!(
        colors = header.colors,
        width = header.width,
        height = header.height,
        "Decoding TLG6 image"
    );

    let width = header.width as usize;
    let height = header.height as usize;
    let colors = u32::from(header.colors);
    let x_blocks = header.x_block_count();
    let main_count = width / BLOCK_WIDTH;
    let fraction = width - main_count * BLOCK_WIDTH;

    let mut input = ByteInput::at(data, cursor.position() as usize);
    let filter_size = input.u32_le()? as usize;
    let filter_types = SlideDecoder::with_filter_text()
        .decompress(input.take(filter_size)?, x_blocks * header.y_block_count())?;

    let initial = if colors == 3 { 0xFF00_0000 } else { 0 };
    let top_line = vec![initial; width];
    let mut image = vec![0u32; width * height];
    let mut residuals = vec![0u32; BLOCK_HEIGHT * width];

    for y in (0..height).step_by(BLOCK_HEIGHT) {
        let ylim = (y + BLOCK_HEIGHT).min(height);
        let rows = ylim - y;
        let pixel_count = rows * width;

        for channel in 0..colors {
            let word = input.u32_le()?;
            if word >> 30 != 0 {
                return Err(DecodeError::unsupported(format!(
                    "TLG6 entropy method {}",
                    word >> 30
                )));
            }
            let bit_length = word & 0x3FFF_FFFF;
            if bit_length > header.max_bit_length {
                return Err(DecodeError::Format(format!(
                    "TLG6 channel of {bit_length} bits exceeds {}",
                    header.max_bit_length
                )));
            }
            let stream = input.take((bit_length as usize).div_ceil(8))?;
            let placement = if channel == 0 && colors != 1 {
                Placement::Full
            } else {
                Placement::Lane(channel)
            };
            decode_golomb_values(stream, &mut residuals[..pixel_count], placement)?;
        }
        trace!(y, rows, "Decoded TLG6 block row residuals");

        let row_filters = &filter_types[(y / BLOCK_HEIGHT) * x_blocks..][..x_blocks];
        for yy in y..ylim {
            let layout = LineLayout {
                width,
                filter_types: row_filters,
                residuals: &residuals[..pixel_count],
                skip: rows * BLOCK_WIDTH,
                odd_skip: (ylim - yy - 1) as isize - (yy - y) as isize,
                forward: yy & 1 == 0,
                initial,
            };
            let (done, rest) = image.split_at_mut(yy * width);
            let prev = if yy == 0 {
                &top_line[..]
            } else {
                &done[(yy - 1) * width..]
            };
            let current = &mut rest[..width];

            if main_count > 0 {
                let start = width.min(BLOCK_WIDTH) * (yy - y);
                layout.decode(prev, current, 0, main_count, start)?;
            }
            if main_count != x_blocks {
                let start = fraction.min(BLOCK_WIDTH) * (yy - y);
                layout.decode(prev, current, main_count, x_blocks, start)?;
            }
        }
    }

    let mut output = PixelBuffer::new(header.width, header.height, PixelFormat::Bgra32);
    for (out, &pixel) in output.data.chunks_exact_mut(4).zip(&image) {
        let bytes = if colors == 1 {
            let v = pixel as u8;
            [v, v, v, 0xFF]
        } else {
            pixel.to_le_bytes()
        };
        out.copy_from_slice(&bytes);
    }
    Ok(output)
}

#[cfg(test)]
#[allow(clippy::expect_used)]
pub(crate) mod encoder {
    //! Reference TLG6 writer
    //!
    //! Only chroma formulas 0 and 1 are inverted; any other formula stores
    //! the plain channel deltas.

    use super::*;
    use crate::tlg::golomb::encoder::encode_golomb_values;

    fn invert_chroma(chroma: u8, delta: u32) -> u32 {
        let [db, dg, dr, da] = delta.to_le_bytes();
        if chroma == 1 {
            u32::from_le_bytes([db.wrapping_sub(dg), dg, dr.wrapping_sub(dg), da])
        } else {
            delta
        }
    }

    /// Encode `pixels` (`0xAARRGGBB`, row-major) with `filter(block_x, block_y)`
    ///
    /// Three-channel images must carry alpha 0xFF; grayscale images carry the
    /// sample in the low byte and zero elsewhere.
    pub(crate) fn encode(
        colors: u8,
        width: u32,
        height: u32,
        pixels: &[u32],
        filter: impl Fn(usize, usize) -> u8,
    ) -> Vec<u8> {
        let w = width as usize;
        let h = height as usize;
        let x_blocks = (w - 1) / BLOCK_WIDTH + 1;
        let y_blocks = (h - 1) / BLOCK_HEIGHT + 1;
        let initial = if colors == 3 { 0xFF00_0000 } else { 0 };
        let at = |x: usize, y: usize| pixels[y * w + x];

        let mut filter_types = Vec::new();
        for by in 0..y_blocks {
            for bx in 0..x_blocks {
                filter_types.push(filter(bx, by));
            }
        }

        let mut streams = Vec::new();
        for y in (0..h).step_by(BLOCK_HEIGHT) {
            let rows = (h - y).min(BLOCK_HEIGHT);
            let skip = rows * BLOCK_WIDTH;
            let mut residuals = vec![0u32; rows * w];
            for r in 0..rows {
                let yy = y + r;
                for block in 0..x_blocks {
                    let x0 = block * BLOCK_WIDTH;
                    let bw = (w - x0).min(BLOCK_WIDTH);
                    let stored_row = if block % 2 == 1 { rows - 1 - r } else { r };
                    let ft = filter_types[(y / BLOCK_HEIGHT) * x_blocks + block];
                    for col in 0..bw {
                        let x = x0 + col;
                        let left = if x == 0 { initial } else { at(x - 1, yy) };
                        let above = if yy == 0 { initial } else { at(x, yy - 1) };
                        let above_left = if x == 0 || yy == 0 {
                            initial
                        } else {
                            at(x - 1, yy - 1)
                        };
                        let predicted = if ft & 1 == 0 {
                            med(left, above, above_left)
                        } else {
                            average(left, above)
                        };
                        let delta = map_lanes(at(x, yy), predicted, 0, |t, p, _| t.wrapping_sub(p));
                        let stored_col = if yy % 2 == 0 { col } else { bw - 1 - col };
                        residuals[skip * block + bw * stored_row + stored_col] =
                            invert_chroma(ft >> 1, delta);
                    }
                }
            }
            for channel in 0..u32::from(colors) {
                let lane: Vec<u8> = residuals.iter().map(|&v| (v >> (channel * 8)) as u8).collect();
                streams.push(encode_golomb_values(&lane));
            }
        }

        let max_bits = streams.iter().map(|s| s.len() * 8).max().unwrap_or(0) as u32;
        let mut out = Vec::new();
        Tlg6Header::new(colors, width, height, max_bits)
            .write(&mut Cursor::new(&mut out))
            .expect("Test operation should succeed");
        let packed = SlideDecoder::with_filter_text().compress(&filter_types);
        out.extend((packed.len() as u32).to_le_bytes());
        out.extend(packed);
        for stream in streams {
            out.extend(((stream.len() * 8) as u32).to_le_bytes());
            out.extend(stream);
        }
        out
    }
}
