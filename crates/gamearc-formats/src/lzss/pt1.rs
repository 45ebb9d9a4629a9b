//! PT1 LZSS
//!
//! Tokens are selected by 16-bit little-endian control words, least
//! significant bit first. A set bit is a back reference `b0 b1` with distance
//! `(b0 & 0xF0) << 4 | b1` and length `(b0 & 0x0F) + 3`; a clear bit is a
//! literal byte.

use super::copy_back;
use crate::error::DecodeResult;
use crate::input::ByteInput;

const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 0x0F + MIN_MATCH;
const MAX_DISTANCE: usize = 0xFFF;

/// Decompress a PT1 stream
pub fn decompress(input: &[u8], expected_size: usize) -> DecodeResult<Vec<u8>> {
    let mut input = ByteInput::new(input);
    let mut out = Vec::with_capacity(expected_size);
    let mut control = 0u16;
    let mut remaining = 0u32;

    while out.len() < expected_size {
        if remaining == 0 {
            control = u16::from_le_bytes(input.pair()?);
            remaining = 16;
        }
        if control & 1 != 0 {
            let [b0, b1] = input.pair()?;
            let distance = (usize::from(b0 & 0xF0) << 4) | usize::from(b1);
            let length = usize::from(b0 & 0x0F) + MIN_MATCH;
            copy_back(&mut out, distance, length, expected_size)?;
        } else {
            out.push(input.u8()?);
        }
        control >>= 1;
        remaining -= 1;
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) fn compress(data: &[u8]) -> Vec<u8> {
    use super::longest_back_match;

    let mut out = Vec::new();
    let mut control_at = 0;
    let mut token = 0;
    let mut pos = 0;
    while pos < data.len() {
        if token % 16 == 0 {
            control_at = out.len();
            out.extend([0, 0]);
        }
        let (distance, length) = longest_back_match(data, pos, MAX_DISTANCE, MAX_MATCH);
        if length >= MIN_MATCH {
            let bit = token % 16;
            out[control_at + bit / 8] |= 1 << (bit % 8);
            out.push((((distance >> 4) & 0xF0) | (length - MIN_MATCH)) as u8);
            out.push(distance as u8);
            pos += length;
        } else {
            out.push(data[pos]);
            pos += 1;
        }
        token += 1;
    }
    out
}
