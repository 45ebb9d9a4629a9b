//! NSA/SAR archive LZSS
//!
//! MSB-first bit stream over a 256-byte zeroed window starting at 239.
//! A `1` bit is followed by an 8-bit literal; a `0` bit by an 8-bit window
//! index and a 4-bit count `j`, copying `j + 2` bytes.

use super::RingWindow;
use crate::bits::{BitReader, BitSource};
use crate::error::DecodeResult;

const WINDOW_SIZE: usize = 256;
const INDEX_BITS: u32 = 8;
const LENGTH_BITS: u32 = 4;
const MIN_MATCH: usize = 2;
const INITIAL_POSITION: usize = WINDOW_SIZE - ((1 << LENGTH_BITS) + 1);

/// Decompress an NSA/SAR LZSS stream
pub fn decompress(input: &[u8], expected_size: usize) -> DecodeResult<Vec<u8>> {
    let mut bits = BitReader::new(input);
    let mut window = RingWindow::new(WINDOW_SIZE, 0, INITIAL_POSITION);
    let mut out = Vec::with_capacity(expected_size);

    while out.len() < expected_size {
        if bits.get_bit()? == 1 {
            let byte = bits.get_bits(8)? as u8;
            out.push(byte);
            window.push(byte);
        } else {
            let index = bits.get_bits(INDEX_BITS)? as usize;
            let count = bits.get_bits(LENGTH_BITS)? as usize;
            window.copy(index, count + MIN_MATCH, &mut out, expected_size);
        }
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) fn compress(data: &[u8]) -> Vec<u8> {
    use crate::bits::BitWriter;

    let max_match = (1 << LENGTH_BITS) - 1 + MIN_MATCH;
    let mut writer = BitWriter::new();
    let mut window = RingWindow::new(WINDOW_SIZE, 0, INITIAL_POSITION);
    let mut pos = 0;
    let mut sink = Vec::new();
    while pos < data.len() {
        let (from, length) = window.longest_match(&data[pos..], max_match);
        if length >= MIN_MATCH {
            writer.put_bit(0);
            writer.put_bits(from as u32, INDEX_BITS);
            writer.put_bits((length - MIN_MATCH) as u32, LENGTH_BITS);
            window.copy(from, length, &mut sink, usize::MAX);
            pos += length;
        } else {
            writer.put_bit(1);
            writer.put_bits(u32::from(data[pos]), 8);
            window.push(data[pos]);
            pos += 1;
        }
    }
    writer.finish()
}
