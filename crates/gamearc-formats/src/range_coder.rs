//! Byte-oriented range decoder with a quasi-static adaptive model
//!
//! The coder works on 32-bit code values with a 31-bit active window and
//! renormalizes a byte at a time whenever the range drops to `2^23` or below.
//! The first byte of a stream is a free header byte; the decoder returns it
//! from [`RangeDecoder::start_decoding`] and otherwise ignores it.
//!
//! [`AdaptiveModel`] keeps two frequency arrays: the cumulative table used for
//! coding, which only changes on a rescale, and the running counts that
//! updates accumulate into. On every rescale the running counts are halved and
//! the frequency mass they lost is handed back through a per-update increment
//! spread over the next rescale interval, so the total stays fixed at
//! `2^lg_totf` at every rescale.

use tracing::{debug, trace, warn};

use crate::config::DecodeLimits;
use crate::error::{DecodeError, DecodeResult};

const TOP: u32 = 1 << 31;
const BOTTOM: u32 = 1 << 23;
const EXTRA_BITS: u32 = 7;

/// Past-the-end reads tolerated before the source counts as truncated
const MAX_OVERRUN: usize = 8;

/// Log2 of the coarse search table size
const TABLE_SHIFT: u32 = 7;

/// Alphabet size of [`decode_range_coded`] streams: 256 bytes plus terminator
pub const BYTE_ALPHABET: usize = 257;
/// Terminating symbol of [`decode_range_coded`] streams
pub const END_OF_STREAM: usize = 256;
/// Log2 of the total frequency used by [`decode_range_coded`]
pub const BYTE_LG_TOTAL: u32 = 12;
/// Rescale interval target used by [`decode_range_coded`]
pub const BYTE_RESCALE: u32 = 2000;

/// Lifecycle of a [`RangeDecoder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoderState {
    /// Created, header not read yet
    Idle,
    /// Symbols can be decoded
    Decoding,
    /// Terminated; further calls fail
    Done,
}

/// Range decoder over an in-memory stream
#[derive(Debug, Clone)]
pub struct RangeDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    overrun: usize,
    low: u32,
    range: u32,
    help: u32,
    buffer: u8,
    state: CoderState,
}

impl<'a> RangeDecoder<'a> {
    /// Create an idle decoder
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            overrun: 0,
            low: 0,
            range: 0,
            help: 0,
            buffer: 0,
            state: CoderState::Idle,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> CoderState {
        self.state
    }

    /// Bytes consumed from the source, including zero padding past the end
    pub fn bytes_read(&self) -> usize {
        self.pos + self.overrun
    }

    fn next_byte(&mut self) -> DecodeResult<u8> {
        if let Some(&byte) = self.data.get(self.pos) {
            self.pos += 1;
            return Ok(byte);
        }
        self.overrun += 1;
        if self.overrun > MAX_OVERRUN {
            return Err(DecodeError::truncated(self.overrun, 0));
        }
        Ok(0)
    }

    fn expect_state(&self, wanted: CoderState) -> DecodeResult<()> {
        if self.state == wanted {
            Ok(())
        } else {
            Err(DecodeError::Format(format!(
                "range decoder is {:?}, expected {wanted:?}",
                self.state
            )))
        }
    }

    /// Read the header byte and prime the lookahead byte
    pub fn start_decoding(&mut self) -> DecodeResult<u8> {
        self.expect_state(CoderState::Idle)?;
        let header = self.next_byte()?;
        self.buffer = self.next_byte()?;
        self.low = u32::from(self.buffer) >> (8 - EXTRA_BITS);
        self.range = 1 << EXTRA_BITS;
        self.state = CoderState::Decoding;
        Ok(header)
    }

    fn normalize(&mut self) -> DecodeResult<()> {
        while self.range <= BOTTOM {
            self.low = (self.low << 8) | ((u32::from(self.buffer) << EXTRA_BITS) & 0xFF);
            self.buffer = self.next_byte()?;
            self.low |= u32::from(self.buffer) >> (8 - EXTRA_BITS);
            self.range <<= 8;
        }
        Ok(())
    }

    /// Cumulative frequency target for a total of `2^shift`
    pub fn decode_culshift(&mut self, shift: u32) -> DecodeResult<u32> {
        self.expect_state(CoderState::Decoding)?;
        self.normalize()?;
        self.help = self.range >> shift;
        if self.help == 0 {
            return Err(DecodeError::Format(format!("range too narrow for 2^{shift} total")));
        }
        let target = self.low / self.help;
        if target >> shift == 0 {
            Ok(target)
        } else {
            Ok((1 << shift) - 1)
        }
    }

    /// Narrow the interval to the symbol `[cumulative, cumulative + frequency)`
    pub fn decode_update(&mut self, frequency: u32, cumulative: u32, total: u32) -> DecodeResult<()> {
        self.expect_state(CoderState::Decoding)?;
        let offset = self.help.wrapping_mul(cumulative);
        self.low = self
            .low
            .checked_sub(offset)
            .ok_or_else(|| DecodeError::Format("range decoder interval underflow".to_string()))?;
        if cumulative + frequency < total {
            self.range = self.help * frequency;
        } else {
            self.range -= offset;
        }
        Ok(())
    }

    /// Mark the stream as terminated
    pub fn finish(&mut self) {
        self.state = CoderState::Done;
    }
}

/// Quasi-static frequency model with a coarse search table
#[derive(Debug, Clone)]
pub struct AdaptiveModel {
    symbols: usize,
    lg_total: u32,
    left: i32,
    next_left: u32,
    rescale: u32,
    target_rescale: u32,
    increment: u32,
    search_shift: u32,
    cumulative: Vec<u32>,
    counts: Vec<u32>,
    search: Vec<usize>,
}

impl AdaptiveModel {
    /// Build a model over `symbols` symbols with a total of `2^lg_total`
    ///
    /// Frequencies start uniform: the total is split evenly and the remainder
    /// goes one apiece to the lowest symbols.
    pub fn new(symbols: usize, lg_total: u32, target_rescale: u32) -> DecodeResult<Self> {
        let valid_total = (TABLE_SHIFT..=16).contains(&lg_total);
        let total = 1usize << lg_total.min(16);
        if !valid_total || symbols < 2 || symbols > total {
            return Err(DecodeError::Format(format!(
                "invalid model: {symbols} symbols over 2^{lg_total}"
            )));
        }
        let mut cumulative = vec![0; symbols + 1];
        cumulative[symbols] = total as u32;
        let mut search = vec![0; (1 << TABLE_SHIFT) + 1];
        search[1 << TABLE_SHIFT] = symbols - 1;

        let mut model = Self {
            symbols,
            lg_total,
            left: 0,
            next_left: 0,
            rescale: 0,
            target_rescale: target_rescale.max(1),
            increment: 0,
            search_shift: lg_total - TABLE_SHIFT,
            cumulative,
            counts: vec![0; symbols + 1],
            search,
        };
        model.reset();
        Ok(model)
    }

    /// Restore the uniform starting distribution
    pub fn reset(&mut self) {
        self.rescale = (self.symbols as u32 >> 4) | 2;
        self.next_left = 0;
        let total = self.cumulative[self.symbols] as usize;
        let base = (total / self.symbols) as u32;
        let extra = total % self.symbols;
        for (index, count) in self.counts.iter_mut().take(self.symbols).enumerate() {
            *count = if index < extra { base + 1 } else { base };
        }
        self.rescale_counts();
    }

    fn rescale_counts(&mut self) {
        if self.next_left > 0 {
            self.increment += 1;
            self.left = self.next_left as i32;
            self.next_left = 0;
            return;
        }
        if self.rescale < self.target_rescale {
            self.rescale = (self.rescale << 1).min(self.target_rescale);
        }

        let mut missing = self.cumulative[self.symbols] as i64;
        for symbol in (0..self.symbols).rev() {
            let count = self.counts[symbol];
            missing -= i64::from(count);
            self.cumulative[symbol] = missing as u32;
            let halved = (count >> 1) | 1;
            missing += i64::from(halved);
            self.counts[symbol] = halved;
        }
        let missing = missing.max(0) as u32;
        self.increment = missing / self.rescale;
        self.next_left = missing % self.rescale;
        self.left = (self.rescale - self.next_left) as i32;

        let mut symbol = self.symbols;
        while symbol > 0 {
            let end = (self.cumulative[symbol] - 1) >> self.search_shift;
            symbol -= 1;
            let start = self.cumulative[symbol] >> self.search_shift;
            for slot in start..=end {
                self.search[slot as usize] = symbol;
            }
        }
        trace!(
            increment = self.increment,
            rescale = self.rescale,
            "Rescaled adaptive model"
        );
    }

    /// Log2 of the total frequency
    pub fn lg_total(&self) -> u32 {
        self.lg_total
    }

    /// Cumulative frequency table, `symbols + 1` entries
    pub fn cumulative(&self) -> &[u32] {
        &self.cumulative
    }

    /// `(frequency, cumulative)` of `symbol`
    pub fn frequency(&self, symbol: usize) -> (u32, u32) {
        let low = self.cumulative[symbol];
        (self.cumulative[symbol + 1] - low, low)
    }

    /// Symbol whose cumulative range contains `target`
    pub fn get_symbol(&self, target: u32) -> usize {
        let slot = (target >> self.search_shift) as usize;
        let mut lo = self.search[slot];
        let mut hi = self.search[slot + 1] + 1;
        while lo + 1 < hi {
            let mid = (lo + hi) >> 1;
            if target < self.cumulative[mid] {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        lo
    }

    /// Count one occurrence of `symbol`
    pub fn update(&mut self, symbol: usize) {
        if self.left <= 0 {
            self.rescale_counts();
        }
        self.left -= 1;
        self.counts[symbol] += self.increment;
    }
}

/// Decode a byte stream coded over the 257-symbol alphabet
///
/// Decoding stops at [`END_OF_STREAM`] and the output must then hold exactly
/// `expected_size` bytes. A stream that keeps producing bytes past
/// `expected_size`, stops short, or runs out of source fails; no partial
/// output is returned.
pub fn decode_range_coded(compressed: &[u8], expected_size: usize) -> DecodeResult<Vec<u8>> {
    decode_range_coded_with_limits(compressed, expected_size, &DecodeLimits::default())
}

/// [`decode_range_coded`] with explicit limits
pub fn decode_range_coded_with_limits(
    compressed: &[u8],
    expected_size: usize,
    limits: &DecodeLimits,
) -> DecodeResult<Vec<u8>> {
    if expected_size == 0 {
        return Ok(Vec::new());
    }
    limits.check_output(expected_size as u64)?;

    let mut model = AdaptiveModel::new(BYTE_ALPHABET, BYTE_LG_TOTAL, BYTE_RESCALE)?;
    let mut decoder = RangeDecoder::new(compressed);
    decoder.start_decoding()?;

    let mut output = Vec::with_capacity(expected_size);
    loop {
        let target = decoder.decode_culshift(BYTE_LG_TOTAL)?;
        let symbol = model.get_symbol(target);
        let (frequency, cumulative) = model.frequency(symbol);
        decoder.decode_update(frequency, cumulative, 1 << BYTE_LG_TOTAL)?;
        if symbol == END_OF_STREAM {
            decoder.finish();
            break;
        }
        if output.len() == expected_size {
            warn!(expected_size, "Range coded stream overruns output buffer");
            return Err(DecodeError::Format(format!(
                "range coded stream exceeds {expected_size} bytes"
            )));
        }
        output.push(symbol as u8);
        model.update(symbol);
    }

    if output.len() != expected_size {
        return Err(DecodeError::CountMismatch {
            context: "range coded output",
            expected: expected_size,
            actual: output.len(),
        });
    }
    debug!(
        input = decoder.bytes_read(),
        output = output.len(),
        "Decoded range coded stream"
    );
    Ok(output)
}


#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::encoder::encode_bytes;
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    fn assert_model_invariants(model: &AdaptiveModel) {
        let table = model.cumulative();
        assert_eq!(table[0], 0);
        assert_eq!(*table.last().expect("Test operation should succeed"), 1 << model.lg_total());
        for pair in table.windows(2) {
            assert!(pair[0] < pair[1], "cumulative table must strictly increase");
        }
    }

    #[test]
    fn test_initial_model_is_uniform() {
        let model = AdaptiveModel::new(257, 12, 2000).expect("Test operation should succeed");
        assert_model_invariants(&model);
        // 4096 = 257 * 15 + 241
        assert_eq!(model.frequency(0), (16, 0));
        assert_eq!(model.frequency(240), (16, 240 * 16));
        assert_eq!(model.frequency(241), (15, 241 * 16));
        assert_eq!(model.get_symbol(0), 0);
        assert_eq!(model.get_symbol(15), 0);
        assert_eq!(model.get_symbol(16), 1);
        assert_eq!(model.get_symbol(4095), 256);
    }

    #[test]
    fn test_model_rejects_bad_parameters() {
        assert!(AdaptiveModel::new(1, 12, 2000).is_err());
        assert!(AdaptiveModel::new(257, 6, 2000).is_err());
        assert!(AdaptiveModel::new(257, 8, 2000).is_err());
    }

    #[test]
    fn test_model_invariants_hold_after_skewed_updates() {
        let mut model = AdaptiveModel::new(257, 12, 2000).expect("Test operation should succeed");
        for i in 0..20_000usize {
            model.update(if i % 7 == 0 { i % 256 } else { 42 });
            if i % 997 == 0 {
                assert_model_invariants(&model);
            }
        }
        assert_model_invariants(&model);
        let (hot, _) = model.frequency(42);
        let (cold, _) = model.frequency(43);
        assert!(hot > cold * 10);
    }

    #[test]
    fn test_round_trip_text() {
        let text = b"the quick brown fox jumps over the lazy dog, the quick brown fox";
        let encoded = encode_bytes(text);
        let decoded = decode_range_coded(&encoded, text.len()).expect("Test operation should succeed");
        assert_eq!(decoded, text.to_vec());
    }

    #[test]
    fn test_round_trip_crosses_rescales() {
        let data: Vec<u8> = (0..30_000u32).map(|i| ((i * i) >> 7) as u8 & 0x0F).collect();
        let encoded = encode_bytes(&data);
        assert!(encoded.len() < data.len());
        let decoded = decode_range_coded(&encoded, data.len()).expect("Test operation should succeed");
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_zero_expected_size_reads_nothing() {
        let decoded = decode_range_coded(&[], 0).expect("Test operation should succeed");
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_empty_source_is_truncated() {
        let err = decode_range_coded(&[0], 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedInput);
        let err = decode_range_coded(&[], 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedInput);
    }

    #[test]
    fn test_size_disagreements_fail() {
        let encoded = encode_bytes(b"abcdef");
        let err = decode_range_coded(&encoded, 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        let err = decode_range_coded(&encoded, 10).unwrap_err();
        assert!(matches!(err, DecodeError::CountMismatch { actual: 6, .. }));
    }

    #[test]
    fn test_limits_checked_before_decoding() {
        let limits = DecodeLimits::new().with_max_output_bytes(16);
        let err = decode_range_coded_with_limits(&[], 17, &limits).unwrap_err();
        assert!(matches!(err, DecodeError::LimitExceeded { requested: 17, .. }));
    }

    #[test]
    fn test_state_machine() {
        let encoded = encode_bytes(b"x");
        let mut decoder = RangeDecoder::new(&encoded);
        assert_eq!(decoder.state(), CoderState::Idle);
        assert!(decoder.decode_culshift(12).is_err());
        assert_eq!(decoder.start_decoding().expect("Test operation should succeed"), 0);
        assert_eq!(decoder.state(), CoderState::Decoding);
        assert!(decoder.start_decoding().is_err());
        decoder.finish();
        assert_eq!(decoder.state(), CoderState::Done);
        assert!(decoder.decode_culshift(12).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn range_coder_round_trip(data in prop::collection::vec(any::<u8>(), 1..2048)) {
                let encoded = encode_bytes(&data);
                let decoded = decode_range_coded(&encoded, data.len())
                    .expect("Test operation should succeed");
                prop_assert_eq!(decoded, data);
            }

            #[test]
            fn range_coder_round_trip_low_entropy(data in prop::collection::vec(0u8..3, 1..4096)) {
                let encoded = encode_bytes(&data);
                let decoded = decode_range_coded(&encoded, data.len())
                    .expect("Test operation should succeed");
                prop_assert_eq!(decoded, data);
            }
        }
    }
}
