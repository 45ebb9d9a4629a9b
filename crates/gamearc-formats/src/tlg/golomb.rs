//! Adaptive Golomb-Rice residuals for TLG6
//!
//! A channel stream alternates zero runs and non-zero runs; the first bit
//! says which comes first. Run lengths are Elias-gamma style: `z` zero bits,
//! a one, then `z` bits added to `1 << z`. Each non-zero value is a unary
//! quotient followed by `k` remainder bits, where `k` comes from a table
//! indexed by a running magnitude accumulator `a` and a four-step phase `n`.
//! Quotients that do not fit in the current 32-bit window are escaped: the
//! reader jumps four bytes, reads the quotient as a byte and continues at
//! bit 0 of the following byte.
//!
//! Bits are consumed least significant first from 32-bit little-endian
//! windows that read zeros past the end of the stream.

use crate::error::{DecodeError, DecodeResult};

const PHASES: usize = 4;
const ACCUMULATOR_RANGE: usize = 1024;
const CHUNK_BITS: u32 = 12;
const CHUNK_MASK: u32 = (1 << CHUNK_BITS) - 1;
const MAX_RUN_BITS: usize = 24;

/// Number of accumulator values mapped to each bit length, per phase
const BIT_LENGTH_RUNS: [[u16; 9]; PHASES] = [
    [3, 7, 15, 27, 63, 108, 223, 448, 130],
    [3, 5, 13, 24, 51, 95, 192, 384, 257],
    [2, 5, 12, 21, 39, 86, 155, 320, 384],
    [2, 3, 9, 18, 33, 61, 129, 258, 511],
];

const fn build_bit_lengths() -> [[u8; PHASES]; ACCUMULATOR_RANGE] {
    let mut table = [[0u8; PHASES]; ACCUMULATOR_RANGE];
    let mut n = 0;
    while n < PHASES {
        let mut a = 0;
        let mut length = 0;
        while length < 9 {
            let mut count = 0;
            while count < BIT_LENGTH_RUNS[n][length] {
                table[a][n] = length as u8;
                a += 1;
                count += 1;
            }
            length += 1;
        }
        n += 1;
    }
    table
}

/// Remainder width for accumulator `a` and phase `n`
pub(crate) static BIT_LENGTHS: [[u8; PHASES]; ACCUMULATOR_RANGE] = build_bit_lengths();

/// Where decoded residual bytes are stored in the 32-bit pixel slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Overwrite the whole slot with the zero-extended byte
    Full,
    /// Replace one byte lane, keeping the others
    Lane(u32),
}

impl Placement {
    fn store(self, slot: &mut u32, value: u8) {
        match self {
            Self::Full => *slot = u32::from(value),
            Self::Lane(lane) => {
                let shift = lane * 8;
                *slot = (*slot & !(0xFF << shift)) | (u32::from(value) << shift);
            }
        }
    }
}

/// LSB-first cursor over a byte stream
#[derive(Debug)]
struct LsbWindow<'a> {
    data: &'a [u8],
    byte: usize,
    bit: u32,
}

impl LsbWindow<'_> {
    fn fetch(&self) -> u32 {
        let mut word = [0u8; 4];
        for (offset, slot) in word.iter_mut().enumerate() {
            *slot = self.data.get(self.byte + offset).copied().unwrap_or(0);
        }
        u32::from_le_bytes(word)
    }

    fn peek(&self) -> u32 {
        self.fetch() >> self.bit
    }

    fn check(&self) -> DecodeResult<()> {
        let consumed = self.byte * 8 + self.bit as usize;
        let total = self.data.len() * 8;
        if consumed > total {
            return Err(DecodeError::truncated(consumed - total, 0));
        }
        Ok(())
    }

    fn advance(&mut self, count: u32) -> DecodeResult<()> {
        let bit = self.bit + count;
        self.byte += (bit >> 3) as usize;
        self.bit = bit & 7;
        self.check()
    }

    fn bits(&mut self, count: u32) -> DecodeResult<u32> {
        let value = self.peek() & ((1u32 << count) - 1);
        self.advance(count)?;
        Ok(value)
    }

    /// Bits up to and including the next set bit
    fn unary(&mut self) -> DecodeResult<usize> {
        let mut total = 0usize;
        loop {
            let chunk = self.peek() & CHUNK_MASK;
            if chunk != 0 {
                let length = chunk.trailing_zeros() + 1;
                self.advance(length)?;
                return Ok(total + length as usize);
            }
            total += CHUNK_BITS as usize;
            self.advance(CHUNK_BITS)?;
        }
    }

    fn run_length(&mut self) -> DecodeResult<usize> {
        let width = self.unary()? - 1;
        if width > MAX_RUN_BITS {
            return Err(DecodeError::Format(format!(
                "Golomb run length with {width} extra bits"
            )));
        }
        let extra = self.bits(width as u32)?;
        Ok((1usize << width) + extra as usize)
    }

    fn value(&mut self, k: u32) -> DecodeResult<u64> {
        let quotient = if self.peek() == 0 {
            self.byte += 5;
            self.bit = 0;
            self.check()?;
            u64::from(self.data[self.byte - 1])
        } else {
            (self.unary()? - 1) as u64
        };
        Ok((quotient << k) + u64::from(self.bits(k)?))
    }
}

/// Decode one channel of Golomb residuals into `pixels`
///
/// Exactly `pixels.len()` values are produced. A run that would overflow the
/// remaining pixels, or an accumulator outside the bit length table, is a
/// format error.
pub(crate) fn decode_golomb_values(
    data: &[u8],
    pixels: &mut [u32],
    placement: Placement,
) -> DecodeResult<()> {
    if pixels.is_empty() {
        return Ok(());
    }
    let Some(&first) = data.first() else {
        return Err(DecodeError::truncated(1, 0));
    };

    let mut reader = LsbWindow {
        data,
        byte: 0,
        bit: 1,
    };
    let mut zero = first & 1 == 0;
    let mut a = 0u64;
    let mut n = PHASES - 1;
    let mut index = 0;

    while index < pixels.len() {
        let count = reader.run_length()?;
        let end = index + count;
        if end > pixels.len() {
            return Err(DecodeError::Format(format!(
                "Golomb run of {count} with {} pixels left",
                pixels.len() - index
            )));
        }

        for slot in &mut pixels[index..end] {
            if zero {
                placement.store(slot, 0);
                continue;
            }
            let k = BIT_LENGTHS
                .get(a as usize)
                .ok_or_else(|| DecodeError::Format(format!("Golomb accumulator {a}")))?[n];
            let code = reader.value(u32::from(k))?;
            let magnitude = code >> 1;
            let value = if code & 1 == 1 {
                (magnitude as u8).wrapping_add(1)
            } else {
                !(magnitude as u8)
            };
            placement.store(slot, value);

            a = a.saturating_add(magnitude);
            if n == 0 {
                a >>= 1;
                n = PHASES - 1;
            } else {
                n -= 1;
            }
        }

        index = end;
        zero = !zero;
    }
    Ok(())
}

/// Reference encoder producing streams for [`decode_golomb_values`]
#[cfg(test)]
pub(crate) mod encoder {
    use super::{BIT_LENGTHS, PHASES};

    #[derive(Debug, Default)]
    struct LsbWriter {
        bytes: Vec<u8>,
        len: usize,
    }

    impl LsbWriter {
        fn put_bit(&mut self, bit: u32) {
            if self.len % 8 == 0 {
                self.bytes.push(0);
            }
            if bit & 1 != 0 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 1 << (self.len % 8);
            }
            self.len += 1;
        }

        fn put_bits(&mut self, value: u32, count: u32) {
            for shift in 0..count {
                self.put_bit(value >> shift);
            }
        }

        fn zero_to(&mut self, position: usize) {
            while self.len < position {
                self.put_bit(0);
            }
        }
    }

    fn put_run(writer: &mut LsbWriter, count: usize) {
        let width = (usize::BITS - 1 - count.leading_zeros()) as usize;
        for _ in 0..width {
            writer.put_bit(0);
        }
        writer.put_bit(1);
        writer.put_bits((count - (1 << width)) as u32, width as u32);
    }

    /// Encode one channel of residual bytes, read as signed values
    pub(crate) fn encode_golomb_values(values: &[u8]) -> Vec<u8> {
        let mut writer = LsbWriter::default();
        let Some(&first) = values.first() else {
            return Vec::new();
        };
        writer.put_bit(u32::from(first != 0));

        let mut a = 0usize;
        let mut n = PHASES - 1;
        let mut index = 0;
        while index < values.len() {
            let zero = values[index] == 0;
            let mut end = index;
            while end < values.len() && (values[end] == 0) == zero {
                end += 1;
            }
            put_run(&mut writer, end - index);

            if !zero {
                for &value in &values[index..end] {
                    let x = i32::from(value as i8);
                    let code = if x > 0 { (x - 1) * 2 + 1 } else { (-x - 1) * 2 } as u32;
                    let k = u32::from(BIT_LENGTHS[a][n]);
                    let quotient = code >> k;
                    let start = writer.len;
                    if quotient >= 32 - (start as u32 & 7) {
                        writer.zero_to(((start >> 3) + 4) * 8);
                        writer.put_bits(quotient, 8);
                    } else {
                        for _ in 0..quotient {
                            writer.put_bit(0);
                        }
                        writer.put_bit(1);
                    }
                    writer.put_bits(code & ((1 << k) - 1), k);

                    a += (code >> 1) as usize;
                    if n == 0 {
                        a >>= 1;
                        n = PHASES - 1;
                    } else {
                        n -= 1;
                    }
                }
            }
            index = end;
        }
        writer.bytes
    }
}
