//! WBM LZSS
//!
//! Flag bytes cover eight tokens, least significant bit first. A set bit is a
//! big-endian 16-bit reference `v` copying `(v & 0x1F) + 3` bytes from
//! `(v >> 5) + 1` bytes back; a clear bit is a literal byte.

use super::copy_back;
use crate::error::DecodeResult;
use crate::input::ByteInput;

const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 0x1F + MIN_MATCH;
const MAX_DISTANCE: usize = (0xFFFF >> 5) + 1;

/// Decompress a WBM stream
pub fn decompress(input: &[u8], expected_size: usize) -> DecodeResult<Vec<u8>> {
    let mut input = ByteInput::new(input);
    let mut out = Vec::with_capacity(expected_size);

    while out.len() < expected_size {
        let flags = input.u8()?;
        for bit in 0..8 {
            if out.len() >= expected_size {
                break;
            }
            if flags & (1 << bit) == 0 {
                out.push(input.u8()?);
            } else {
                let reference = usize::from(u16::from_be_bytes(input.pair()?));
                let distance = (reference >> 5) + 1;
                let length = (reference & 0x1F) + MIN_MATCH;
                copy_back(&mut out, distance, length, expected_size)?;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) fn compress(data: &[u8]) -> Vec<u8> {
    use super::longest_back_match;

    let mut out = Vec::new();
    let mut flag_at = 0;
    let mut token = 0;
    let mut pos = 0;
    while pos < data.len() {
        if token % 8 == 0 {
            flag_at = out.len();
            out.push(0);
        }
        let (distance, length) = longest_back_match(data, pos, MAX_DISTANCE, MAX_MATCH);
        if length >= MIN_MATCH {
            out[flag_at] |= 1 << (token % 8);
            let reference = (((distance - 1) << 5) | (length - MIN_MATCH)) as u16;
            out.extend(reference.to_be_bytes());
            pos += length;
        } else {
            out.push(data[pos]);
            pos += 1;
        }
        token += 1;
    }
    out
}
