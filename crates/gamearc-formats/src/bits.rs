//! MSB-first bit extraction
//!
//! [`BitSource`] is the object-safe reader interface shared by every entropy
//! decoder in this crate; [`BitReader`] implements it over an in-memory byte
//! slice with a 64-bit lookahead window. Reads past the end of the source fail
//! with [`DecodeError::TruncatedInput`] carrying bit counts.
//!
//! Gamma codes use the interleaved form: starting from 1, every `1` bit is
//! followed by one payload bit shifted into the value, and a `0` bit ends the
//! code. Values 1..=15 fit in eight bits and are decoded through a lookup
//! table when at least eight bits are available.

use crate::error::{DecodeError, DecodeResult};

/// Widest read supported by [`BitSource::get_bits`]
pub const MAX_READ_BITS: u32 = 32;

#[derive(Debug, Clone, Copy)]
struct GammaEntry {
    value: u8,
    length: u8,
}

const fn build_gamma_table() -> [GammaEntry; 256] {
    let mut table = [GammaEntry { value: 0, length: 0 }; 256];
    let mut prefix = 0usize;
    while prefix < 256 {
        let mut value = 1u32;
        let mut pos = 0u32;
        let mut complete = false;
        while pos < 8 {
            let flag = (prefix >> (7 - pos)) & 1;
            pos += 1;
            if flag == 0 {
                complete = true;
                break;
            }
            if pos == 8 {
                break;
            }
            value = (value << 1) | ((prefix >> (7 - pos)) & 1) as u32;
            pos += 1;
        }
        if complete {
            table[prefix] = GammaEntry {
                value: value as u8,
                length: pos as u8,
            };
        }
        prefix += 1;
    }
    table
}

static GAMMA_TABLE: [GammaEntry; 256] = build_gamma_table();

/// Bit-level input consumed by entropy decoders
pub trait BitSource {
    /// Read one bit
    fn get_bit(&mut self) -> DecodeResult<u32>;

    /// Read `count` bits (at most [`MAX_READ_BITS`]), first bit most significant
    fn get_bits(&mut self, count: u32) -> DecodeResult<u32>;

    /// Return the next `count` bits without consuming them
    fn peek_bits(&mut self, count: u32) -> DecodeResult<u32>;

    /// Discard `count` bits
    fn skip_bits(&mut self, count: u32) -> DecodeResult<()>;

    /// Bits left in the source
    fn available_bits(&self) -> usize;

    /// Read an interleaved gamma code (value >= 1)
    fn get_gamma_code(&mut self) -> DecodeResult<u32> {
        if self.available_bits() >= 8 {
            let entry = GAMMA_TABLE[self.peek_bits(8)? as usize];
            if entry.length != 0 {
                self.skip_bits(u32::from(entry.length))?;
                return Ok(u32::from(entry.value));
            }
        }

        let mut code = 1u32;
        while self.get_bit()? == 1 {
            if code >= 1 << 31 {
                return Err(DecodeError::Format("gamma code exceeds 32 bits".to_string()));
            }
            code = (code << 1) | self.get_bit()?;
        }
        Ok(code)
    }
}

/// MSB-first reader over a byte slice
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    next: usize,
    window: u64,
    window_bits: u32,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the first bit of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            next: 0,
            window: 0,
            window_bits: 0,
        }
    }

    fn refill(&mut self) {
        while self.window_bits <= 56 {
            let Some(&byte) = self.data.get(self.next) else {
                break;
            };
            self.window |= u64::from(byte) << (56 - self.window_bits);
            self.window_bits += 8;
            self.next += 1;
        }
    }

    fn ensure(&mut self, count: u32) -> DecodeResult<()> {
        if count > MAX_READ_BITS {
            return Err(DecodeError::Format(format!(
                "bit read of {count} exceeds {MAX_READ_BITS} bits"
            )));
        }
        if self.window_bits < count {
            self.refill();
            if self.window_bits < count {
                return Err(DecodeError::truncated(
                    count as usize,
                    self.window_bits as usize,
                ));
            }
        }
        Ok(())
    }

    fn consume(&mut self, count: u32) {
        if count > 0 {
            self.window <<= count;
            self.window_bits -= count;
        }
    }

    /// Bits left in the source
    pub fn remaining_bits(&self) -> usize {
        self.window_bits as usize + (self.data.len() - self.next) * 8
    }

    /// Drop bits up to the next byte boundary
    pub fn align_to_byte(&mut self) {
        let partial = self.window_bits % 8;
        self.consume(partial);
    }

    /// Offset of the next unread whole byte
    pub fn byte_position(&self) -> usize {
        self.next - (self.window_bits / 8) as usize
    }
}

impl BitSource for BitReader<'_> {
    fn get_bit(&mut self) -> DecodeResult<u32> {
        self.get_bits(1)
    }

    fn get_bits(&mut self, count: u32) -> DecodeResult<u32> {
        if count == 0 {
            return Ok(0);
        }
        self.ensure(count)?;
        let value = (self.window >> (64 - count)) as u32;
        self.consume(count);
        Ok(value)
    }

    fn peek_bits(&mut self, count: u32) -> DecodeResult<u32> {
        if count == 0 {
            return Ok(0);
        }
        self.ensure(count)?;
        Ok((self.window >> (64 - count)) as u32)
    }

    fn skip_bits(&mut self, count: u32) -> DecodeResult<()> {
        let mut left = count;
        while left > 0 {
            let step = left.min(MAX_READ_BITS);
            self.ensure(step)?;
            self.consume(step);
            left -= step;
        }
        Ok(())
    }

    fn available_bits(&self) -> usize {
        self.remaining_bits()
    }
}

/// MSB-first writer used to build test streams
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    current: u8,
    used: u32,
}

#[cfg(test)]
impl BitWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put_bit(&mut self, bit: u32) {
        self.current = (self.current << 1) | (bit & 1) as u8;
        self.used += 1;
        if self.used == 8 {
            self.bytes.push(self.current);
            self.current = 0;
            self.used = 0;
        }
    }

    pub(crate) fn put_bits(&mut self, value: u32, count: u32) {
        for shift in (0..count).rev() {
            self.put_bit(value >> shift);
        }
    }

    pub(crate) fn put_gamma(&mut self, value: u32) {
        assert!(value >= 1, "gamma codes start at 1");
        let width = 32 - value.leading_zeros();
        for shift in (0..width - 1).rev() {
            self.put_bit(1);
            self.put_bit(value >> shift);
        }
        self.put_bit(0);
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.bytes.push(self.current << (8 - self.used));
        }
        self.bytes
    }
}
