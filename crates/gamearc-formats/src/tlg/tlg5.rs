//! TLG5 images
//!
//! Rows are grouped into blocks of `block_height` lines. Each block stores
//! one plane per channel, either raw or slide compressed against a text
//! buffer that persists across all blocks and channels of the image. Planes
//! hold horizontal deltas with green folded into blue and red; every line is
//! then added to the line above it.

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};
use tracing::{debug, trace};

use crate::config::DecodeLimits;
use crate::error::{DecodeError, DecodeResult};
use crate::input::ByteInput;
use crate::lzss::SlideDecoder;
use crate::pixel::{PixelBuffer, PixelFormat};

/// Signature of a TLG5 stream
pub const TLG5_MAGIC: [u8; 11] = *b"TLG5.0\0raw\x1a";

/// TLG5 stream header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct Tlg5Header {
    /// Signature, always `TLG5.0\0raw\x1a`
    #[br(assert(magic == TLG5_MAGIC, "Invalid TLG5 magic: {:?}", magic))]
    pub magic: [u8; 11],

    /// Channel count: 3 or 4
    pub colors: u8,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Lines per block
    pub block_height: u32,
}

impl Tlg5Header {
    /// Encoded header size in bytes
    pub const SIZE: usize = 24;

    /// Check fields the decoder depends on
    pub fn validate(&self) -> DecodeResult<()> {
        if !matches!(self.colors, 3 | 4) {
            return Err(DecodeError::Format(format!(
                "TLG5 with {} color channels",
                self.colors
            )));
        }
        if self.block_height == 0 {
            return Err(DecodeError::Format("TLG5 block height of zero".to_string()));
        }
        Ok(())
    }

    /// Number of row blocks
    pub fn block_count(&self) -> usize {
        (self.height as usize - 1) / self.block_height as usize + 1
    }
}

/// Decode a TLG5 stream into BGRA pixels
pub fn decode(data: &[u8], limits: &DecodeLimits) -> DecodeResult<PixelBuffer> {
    let mut cursor = Cursor::new(data);
    let header = Tlg5Header::read(&mut cursor)?;
    header.validate()?;
    limits.check_image(header.width, header.height, 4)?;
    debug!(
        colors = header.colors,
        width = header.width,
        height = header.height,
        block_height = header.block_height,
        "Decoding TLG5 image"
    );

    let width = header.width as usize;
    let height = header.height as usize;
    let colors = usize::from(header.colors);
    let block_height = header.block_height as usize;

    let mut input = ByteInput::at(data, cursor.position() as usize);
    // Block size table, not needed for sequential decoding.
    input.skip(header.block_count() * 4)?;

    let mut slide = SlideDecoder::new();
    let mut planes: Vec<Vec<u8>> = vec![Vec::new(); colors];
    let mut output = PixelBuffer::new(header.width, header.height, PixelFormat::Bgra32);
    let stride = output.stride;

    for y0 in (0..height).step_by(block_height) {
        let rows = block_height.min(height - y0);
        let plane_size = rows * width;
        for (channel, plane) in planes.iter_mut().enumerate() {
            let mark = input.u8()?;
            let size = input.u32_le()? as usize;
            let stored = input.take(size)?;
            plane.clear();
            if mark == 0 {
                slide.decompress_into(stored, plane, plane_size)?;
            } else {
                if size < plane_size {
                    return Err(DecodeError::CountMismatch {
                        context: "TLG5 raw plane",
                        expected: plane_size,
                        actual: size,
                    });
                }
                plane.extend_from_slice(&stored[..plane_size]);
            }
            trace!(y0, channel, mark, size, "Read TLG5 plane");
        }

        for row in 0..rows {
            let y = y0 + row;
            let (done, rest) = output.data.split_at_mut(y * stride);
            let prev = if y == 0 { None } else { Some(&done[(y - 1) * stride..]) };
            let line = &mut rest[..stride];
            let mut running = [0u8; 4];
            for x in 0..width {
                let at = row * width + x;
                let g = planes[1][at];
                let deltas = [
                    planes[0][at].wrapping_add(g),
                    g,
                    planes[2][at].wrapping_add(g),
                    if colors == 4 { planes[3][at] } else { 0 },
                ];
                for lane in 0..4 {
                    running[lane] = running[lane].wrapping_add(deltas[lane]);
                    let above = prev.map_or(0, |p| p[x * 4 + lane]);
                    line[x * 4 + lane] = running[lane].wrapping_add(above);
                }
                if colors == 3 {
                    line[x * 4 + 3] = 0xFF;
                }
            }
        }
    }
    Ok(output)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    /// Encode BGRA rows, compressing every plane unless `raw` is set
    fn encode(colors: u8, width: u32, height: u32, block_height: u32, bgra: &[u8], raw: bool) -> Vec<u8> {
        let header = Tlg5Header {
            magic: TLG5_MAGIC,
            colors,
            width,
            height,
            block_height,
        };
        let mut out = Vec::new();
        header
            .write(&mut Cursor::new(&mut out))
            .expect("Test operation should succeed");
        out.extend(vec![0u8; header.block_count() * 4]);

        let (w, h, bh) = (width as usize, height as usize, block_height as usize);
        let px = |x: usize, y: usize, lane: usize| bgra[(y * w + x) * 4 + lane];
        let mut slide = SlideDecoder::new();
        for y0 in (0..h).step_by(bh) {
            let rows = bh.min(h - y0);
            let mut planes = vec![Vec::new(); usize::from(colors)];
            for y in y0..y0 + rows {
                let mut vertical = Vec::new();
                for x in 0..w {
                    let mut lanes = [0u8; 4];
                    for (lane, slot) in lanes.iter_mut().enumerate() {
                        let above = if y == 0 { 0 } else { px(x, y - 1, lane) };
                        *slot = px(x, y, lane).wrapping_sub(above);
                    }
                    vertical.push(lanes);
                }
                for x in 0..w {
                    let left = if x == 0 { [0; 4] } else { vertical[x - 1] };
                    let d: Vec<u8> = (0..4).map(|l| vertical[x][l].wrapping_sub(left[l])).collect();
                    planes[0].push(d[0].wrapping_sub(d[1]));
                    planes[1].push(d[1]);
                    planes[2].push(d[2].wrapping_sub(d[1]));
                    if colors == 4 {
                        planes[3].push(d[3]);
                    }
                }
            }
            for plane in planes {
                if raw {
                    out.push(1);
                    out.extend((plane.len() as u32).to_le_bytes());
                    out.extend(plane);
                } else {
                    let packed = slide.compress(&plane);
                    out.push(0);
                    out.extend((packed.len() as u32).to_le_bytes());
                    out.extend(packed);
                }
            }
        }
        out
    }

    fn gradient(width: u32, height: u32, opaque: bool) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| {
                let (x, y) = (i % width, i / width);
                let alpha = if opaque { 0xFF } else { (x * 40 + y) as u8 };
                [(x * 7) as u8, (y * 3 + x) as u8, ((x ^ y) * 5) as u8, alpha]
            })
            .collect()
    }

    #[test]
    fn test_header_layout() {
        let header = Tlg5Header {
            magic: TLG5_MAGIC,
            colors: 4,
            width: 10,
            height: 9,
            block_height: 4,
        };
        let mut bytes = Vec::new();
        header
            .write(&mut Cursor::new(&mut bytes))
            .expect("Test operation should succeed");
        assert_eq!(bytes.len(), Tlg5Header::SIZE);
        assert_eq!(header.block_count(), 3);
        let parsed = Tlg5Header::read(&mut Cursor::new(&bytes)).expect("Test operation should succeed");
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_single_pixel() {
        // One opaque pixel: planes hold b - g, g, r - g.
        let mut data = Vec::new();
        data.extend(TLG5_MAGIC);
        data.push(3);
        data.extend(1u32.to_le_bytes());
        data.extend(1u32.to_le_bytes());
        data.extend(4u32.to_le_bytes());
        data.extend([0; 4]);
        for value in [0x10u8, 0x20, 0x30] {
            data.push(1);
            data.extend(1u32.to_le_bytes());
            data.push(value);
        }
        let image = decode(&data, &DecodeLimits::default()).expect("Test operation should succeed");
        assert_eq!(image.data, vec![0x30, 0x20, 0x50, 0xFF]);
    }

    #[test]
    fn test_round_trips() {
        for (colors, width, height, block_height) in
            [(3, 5, 7, 4), (4, 16, 16, 4), (4, 3, 1, 8), (3, 33, 9, 2)]
        {
            let bgra = gradient(width, height, colors == 3);
            for raw in [false, true] {
                let data = encode(colors, width, height, block_height, &bgra, raw);
                let image = decode(&data, &DecodeLimits::default()).expect("Test operation should succeed");
                assert_eq!(image.data, bgra, "{colors} colors {width}x{height} raw={raw}");
            }
        }
    }

    #[test]
    fn test_text_buffer_spans_blocks() {
        // Identical blocks compress against the text of earlier blocks.
        let bgra: Vec<u8> = (0..32 * 32).flat_map(|i| [(i % 32) as u8, 9, 200, 0xFF]).collect();
        let data = encode(3, 32, 32, 4, &bgra, false);
        assert!(data.len() < bgra.len() / 4);
        let image = decode(&data, &DecodeLimits::default()).expect("Test operation should succeed");
        assert_eq!(image.data, bgra);
    }

    #[test]
    fn test_rejections() {
        let bgra = gradient(4, 4, true);
        let data = encode(3, 4, 4, 2, &bgra, true);

        let mut bad = data.clone();
        bad[11] = 2;
        assert_eq!(decode(&bad, &DecodeLimits::default()).unwrap_err().kind(), ErrorKind::Format);

        let mut zero_height = data.clone();
        zero_height[20..24].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(
            decode(&zero_height, &DecodeLimits::default()).unwrap_err().kind(),
            ErrorKind::Format
        );

        assert_eq!(
            decode(&data[..data.len() - 1], &DecodeLimits::default())
                .unwrap_err()
                .kind(),
            ErrorKind::TruncatedInput
        );

        let mut short_raw = data;
        // First plane follows the 24-byte header and two table entries.
        short_raw[33..37].copy_from_slice(&7u32.to_le_bytes());
        assert!(matches!(
            decode(&short_raw, &DecodeLimits::default()).unwrap_err(),
            DecodeError::CountMismatch { .. }
        ));
    }
}
