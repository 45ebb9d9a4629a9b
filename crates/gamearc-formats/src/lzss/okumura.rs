//! Flag-byte LZSS in the classic layout
//!
//! Each flag byte covers eight tokens, least significant bit first; a set bit
//! is a literal. A match is two bytes `b0 b1` giving window position
//! `b0 | (b1 & 0xF0) << 4` and length `(b1 & 0x0F) + threshold + 1`.

use serde::{Deserialize, Serialize};

use super::RingWindow;
use crate::error::{DecodeError, DecodeResult};
use crate::input::ByteInput;

/// Window layout of an Okumura-style stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OkumuraParams {
    /// Window size in bytes; a power of two no larger than 4096
    pub window_size: usize,
    /// Longest match that is still stored as literals
    pub threshold: usize,
    /// Initial window contents
    pub fill: u8,
    /// First window position written
    pub initial_position: usize,
}

impl Default for OkumuraParams {
    fn default() -> Self {
        Self {
            window_size: 4096,
            threshold: 2,
            fill: b' ',
            initial_position: 4096 - 18,
        }
    }
}

impl OkumuraParams {
    /// Longest match a single token can encode
    pub fn max_match(&self) -> usize {
        0x0F + self.threshold + 1
    }

    fn validate(&self) -> DecodeResult<()> {
        if !self.window_size.is_power_of_two() || self.window_size > 4096 || self.window_size < 16 {
            return Err(DecodeError::Format(format!(
                "LZSS window of {} bytes",
                self.window_size
            )));
        }
        Ok(())
    }
}

/// Decompress an Okumura-style LZSS stream
pub fn decompress(params: &OkumuraParams, input: &[u8], expected_size: usize) -> DecodeResult<Vec<u8>> {
    params.validate()?;
    let mut input = ByteInput::new(input);
    let mut window = RingWindow::new(params.window_size, params.fill, params.initial_position);
    let mut out = Vec::with_capacity(expected_size);
    let mut flags = 0u32;

    while out.len() < expected_size {
        flags >>= 1;
        if flags & 0x100 == 0 {
            flags = u32::from(input.u8()?) | 0xFF00;
        }
        if flags & 1 != 0 {
            let byte = input.u8()?;
            out.push(byte);
            window.push(byte);
        } else {
            let [b0, b1] = input.pair()?;
            let from = usize::from(b0) | (usize::from(b1 & 0xF0) << 4);
            let length = usize::from(b1 & 0x0F) + params.threshold + 1;
            window.copy(from, length, &mut out, expected_size);
        }
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) fn compress(params: &OkumuraParams, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut window = RingWindow::new(params.window_size, params.fill, params.initial_position);
    let mut sink = Vec::new();
    let mut flag_at = 0;
    let mut token = 0;
    let mut pos = 0;
    while pos < data.len() {
        if token % 8 == 0 {
            flag_at = out.len();
            out.push(0);
        }
        let (from, length) = window.longest_match(&data[pos..], params.max_match());
        if length > params.threshold {
            out.push(from as u8);
            out.push((((from >> 4) & 0xF0) | (length - params.threshold - 1)) as u8);
            window.copy(from, length, &mut sink, usize::MAX);
            pos += length;
        } else {
            out[flag_at] |= 1 << (token % 8);
            out.push(data[pos]);
            window.push(data[pos]);
            pos += 1;
        }
        token += 1;
    }
    out
}
