//! Decoded output buffers
//!
//! Decoders hand back flat buffers plus the metadata needed to interpret
//! them; presentation layers take over from here.

/// Layout of one pixel in a [`PixelBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit grayscale
    Gray8,
    /// 16-bit little-endian `0RRRRRGGGGGBBBBB`
    Bgr555,
    /// 24-bit blue, green, red
    Bgr24,
    /// 32-bit blue, green, red, alpha
    Bgra32,
}

impl PixelFormat {
    /// Bytes per pixel
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Bgr555 => 2,
            Self::Bgr24 => 3,
            Self::Bgra32 => 4,
        }
    }
}

/// Top-down image with tightly packed rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row
    pub stride: usize,
    /// Pixel layout
    pub format: PixelFormat,
    /// `stride * height` bytes
    pub data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width as usize * format.bytes_per_pixel();
        Self {
            width,
            height,
            stride,
            format,
            data: vec![0; stride * height as usize],
        }
    }

    /// Bytes of row `y`
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.stride]
    }

    /// Mutable bytes of row `y`
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        &mut self.data[start..start + self.stride]
    }

    /// Pixel at `(x, y)` as packed `0xAARRGGBB`
    ///
    /// Formats without alpha report `0xFF`; grayscale replicates the sample.
    pub fn argb(&self, x: u32, y: u32) -> u32 {
        let bpp = self.format.bytes_per_pixel();
        let at = y as usize * self.stride + x as usize * bpp;
        let px = &self.data[at..at + bpp];
        match self.format {
            PixelFormat::Gray8 => {
                let v = u32::from(px[0]);
                0xFF00_0000 | (v << 16) | (v << 8) | v
            }
            PixelFormat::Bgr555 => {
                let v = u32::from(u16::from_le_bytes([px[0], px[1]]));
                let expand = |c: u32| (c << 3) | (c >> 2);
                0xFF00_0000
                    | (expand((v >> 10) & 0x1F) << 16)
                    | (expand((v >> 5) & 0x1F) << 8)
                    | expand(v & 0x1F)
            }
            PixelFormat::Bgr24 => {
                0xFF00_0000 | (u32::from(px[2]) << 16) | (u32::from(px[1]) << 8) | u32::from(px[0])
            }
            PixelFormat::Bgra32 => u32::from_le_bytes([px[0], px[1], px[2], px[3]]),
        }
    }
}

/// Interleaved 16-bit PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleBuffer {
    /// Channel count
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved samples
    pub samples: Vec<i16>,
}

impl SampleBuffer {
    /// Bits per sample; always 16
    pub const BITS_PER_SAMPLE: u16 = 16;

    /// Number of sample frames
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / usize::from(self.channels)
        }
    }

    /// Little-endian byte view of the samples
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_argb_per_format() {
        let mut gray = PixelBuffer::new(2, 1, PixelFormat::Gray8);
        gray.data[1] = 0x40;
        assert_eq!(gray.argb(1, 0), 0xFF40_4040);

        let mut bgr = PixelBuffer::new(1, 2, PixelFormat::Bgr24);
        bgr.row_mut(1).copy_from_slice(&[1, 2, 3]);
        assert_eq!(bgr.argb(0, 1), 0xFF03_0201);
        assert_eq!(bgr.stride, 3);

        let mut hi = PixelBuffer::new(1, 1, PixelFormat::Bgr555);
        hi.data.copy_from_slice(&0x7C00u16.to_le_bytes());
        assert_eq!(hi.argb(0, 0), 0xFFFF_0000);

        let mut bgra = PixelBuffer::new(1, 1, PixelFormat::Bgra32);
        bgra.data.copy_from_slice(&[4, 3, 2, 1]);
        assert_eq!(bgra.argb(0, 0), 0x0102_0304);
    }

    #[test]
    fn test_sample_buffer_views() {
        let buffer = SampleBuffer {
            channels: 2,
            sample_rate: 22050,
            samples: vec![1, -1, 256, 0],
        };
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.to_le_bytes(), vec![1, 0, 0xFF, 0xFF, 0, 1, 0, 0]);
    }
}
