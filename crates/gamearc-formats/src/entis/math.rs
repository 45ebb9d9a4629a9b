//! Transform math shared by lossy ERI images and MIO sound
//!
//! A coded block goes through dequantization, the inverse of an odd-index
//! Givens rotation chain, an inverse DCT and, for lapped streams, a pair
//! fold followed by overlap with the previous block.

use std::f64::consts::PI;

use crate::error::{DecodeError, DecodeResult};

/// Smallest supported block degree
pub const MIN_DEGREE: u32 = 2;

/// Largest supported block degree
pub const MAX_DEGREE: u32 = 12;

/// Breakpoints of the weight curve in sixteenths of the block length
const WEIGHT_BREAKPOINTS: [f64; 8] = [0.0, 1.0, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0];

/// Reject degrees outside [`MIN_DEGREE`]..=`max`
pub fn check_degree(degree: u32, max: u32) -> DecodeResult<usize> {
    if !(MIN_DEGREE..=max).contains(&degree) {
        return Err(DecodeError::Format(format!(
            "transform degree {degree} outside {MIN_DEGREE}..={max}"
        )));
    }
    Ok(1 << degree)
}

/// Per-frequency step sizes rebuilt from a packed weight code
#[derive(Debug, Clone, PartialEq)]
pub struct QuantumTable {
    steps: Vec<f64>,
}

impl QuantumTable {
    /// Build steps for `length` frequency bands
    ///
    /// Each nibble of `weight_code` sets the step ratio `2^(nibble / 2)` at one
    /// breakpoint; bands between breakpoints interpolate linearly and bands
    /// past the last one keep its ratio. Every step is scaled by
    /// `coefficient / 256`.
    pub fn new(length: usize, weight_code: u32, coefficient: u16) -> Self {
        let ratios: Vec<f64> = (0..8)
            .map(|j| 2f64.powf(f64::from((weight_code >> (4 * j)) & 0xF) / 2.0))
            .collect();
        let points: Vec<f64> = WEIGHT_BREAKPOINTS
            .iter()
            .map(|p| p * length as f64 / 16.0)
            .collect();
        let scale = f64::from(coefficient) / 256.0;

        let steps = (0..length)
            .map(|band| {
                let k = band as f64;
                let ratio = match points.iter().rposition(|&p| p <= k) {
                    Some(j) if j + 1 < points.len() => {
                        let t = (k - points[j]) / (points[j + 1] - points[j]);
                        ratios[j] + (ratios[j + 1] - ratios[j]) * t
                    }
                    _ => ratios[7],
                };
                ratio * scale
            })
            .collect();
        Self { steps }
    }

    /// Step of frequency band `band`
    pub fn step(&self, band: usize) -> f64 {
        self.steps[band]
    }

    /// Scale symbols of a one dimensional block
    pub fn dequantize(&self, symbols: &[i32], out: &mut [f64]) {
        for (band, (value, &symbol)) in out.iter_mut().zip(symbols).enumerate() {
            *value = f64::from(symbol) * self.steps[band];
        }
    }

    /// Scale symbols of a square block stored row by row
    ///
    /// The band of coefficient `(u, v)` is `max(u, v)`.
    pub fn dequantize_square(&self, symbols: &[i32], out: &mut [f64]) {
        let side = self.steps.len();
        for (index, (value, &symbol)) in out.iter_mut().zip(symbols).enumerate() {
            let band = (index / side).max(index % side);
            *value = f64::from(symbol) * self.steps[band];
        }
    }
}

/// Rotation chain over odd coefficient pairs `(1, 3), (3, 5), ...`
#[derive(Debug, Clone, PartialEq)]
pub struct GivensRotations {
    length: usize,
    rotations: Vec<(f64, f64)>,
}

impl GivensRotations {
    /// Rotations for blocks of `length` coefficients
    pub fn new(length: usize) -> Self {
        let count = length.saturating_sub(2) / 2;
        let rotations = (0..count)
            .map(|i| {
                let angle = PI * (2 * i + 1) as f64 / (8 * length) as f64;
                (angle.cos(), angle.sin())
            })
            .collect();
        Self { length, rotations }
    }

    /// Undo the chain in place
    pub fn inverse(&self, block: &mut [f64]) {
        debug_assert_eq!(block.len(), self.length);
        for (i, &(cos, sin)) in self.rotations.iter().enumerate().rev() {
            let (a, b) = (block[2 * i + 1], block[2 * i + 3]);
            block[2 * i + 1] = a * cos + b * sin;
            block[2 * i + 3] = b * cos - a * sin;
        }
    }

    #[cfg(test)]
    pub(crate) fn forward(&self, block: &mut [f64]) {
        for (i, &(cos, sin)) in self.rotations.iter().enumerate() {
            let (a, b) = (block[2 * i + 1], block[2 * i + 3]);
            block[2 * i + 1] = a * cos - b * sin;
            block[2 * i + 3] = a * sin + b * cos;
        }
    }
}

/// Inverse of the unnormalized DCT-II, in place
///
/// `block.len()` must be a power of two no smaller than four.
pub fn fast_idct(block: &mut [f64]) {
    let n = block.len();
    block[0] /= 2.0;
    let mut scratch = vec![0.0; n];
    lee_idct(block, &mut scratch);
    let scale = 2.0 / n as f64;
    for value in block.iter_mut() {
        *value *= scale;
    }
}

/// Unscaled DCT-III, `y[i] = sum of x[k] * cos(pi * (2i + 1) * k / 2n)`
fn lee_idct(block: &mut [f64], scratch: &mut [f64]) {
    let n = block.len();
    if n <= 4 {
        let mut out = [0.0; 4];
        for (i, value) in out.iter_mut().enumerate().take(n) {
            *value = block
                .iter()
                .enumerate()
                .map(|(k, &x)| x * (PI * ((2 * i + 1) * k) as f64 / (2 * n) as f64).cos())
                .sum();
        }
        block.copy_from_slice(&out[..n]);
        return;
    }

    let half = n / 2;
    scratch[0] = block[0];
    scratch[half] = block[1];
    for i in 1..half {
        scratch[i] = block[2 * i];
        scratch[half + i] = block[2 * i - 1] + block[2 * i + 1];
    }
    {
        let (even, odd) = scratch[..n].split_at_mut(half);
        let (even_scratch, odd_scratch) = block.split_at_mut(half);
        lee_idct(even, even_scratch);
        lee_idct(odd, odd_scratch);
    }
    for i in 0..half {
        let x = scratch[i];
        let y = scratch[half + i] / (2.0 * (PI * (2 * i + 1) as f64 / (2 * n) as f64).cos());
        block[i] = x + y;
        block[n - 1 - i] = x - y;
    }
}

/// Unnormalized DCT-II
#[cfg(test)]
pub(crate) fn dct(block: &mut [f64]) {
    let n = block.len();
    let input = block.to_vec();
    for (k, value) in block.iter_mut().enumerate() {
        *value = input
            .iter()
            .enumerate()
            .map(|(i, &x)| x * (PI * ((2 * i + 1) * k) as f64 / (2 * n) as f64).cos())
            .sum();
    }
}

/// Unfold pairs `(x[i], x[i + n/2])` into their sum and difference
pub fn fast_iplot(block: &mut [f64]) {
    let half = block.len() / 2;
    let (low, high) = block.split_at_mut(half);
    for (a, b) in low.iter_mut().zip(high.iter_mut()) {
        let (sum, difference) = (*a + *b, *a - *b);
        *a = sum;
        *b = difference;
    }
}

#[cfg(test)]
pub(crate) fn fast_plot(block: &mut [f64]) {
    let half = block.len() / 2;
    let (low, high) = block.split_at_mut(half);
    for (a, b) in low.iter_mut().zip(high.iter_mut()) {
        let (mean, half_difference) = ((*a + *b) / 2.0, (*a - *b) / 2.0);
        *a = mean;
        *b = half_difference;
    }
}

/// Overlap the lower half of `block` with the upper half of the previous block
///
/// `carry` holds that upper half and is replaced by the one of `block`.
pub fn fast_ilot(carry: &mut [f64], block: &mut [f64]) {
    let half = carry.len();
    for i in 0..half {
        block[i] += 0.5 * carry[half - 1 - i];
    }
    carry.copy_from_slice(&block[half..]);
}

#[cfg(test)]
pub(crate) fn fast_lot(carry: &mut [f64], block: &mut [f64]) {
    let half = carry.len();
    for i in 0..half {
        block[i] -= 0.5 * carry[half - 1 - i];
    }
    carry.copy_from_slice(&block[half..]);
}

/// Round half away from zero and saturate to `i16`
pub fn round_to_i16(value: f64) -> i16 {
    value.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Round half away from zero and saturate to `u8`
pub fn round_to_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Undo rotations then the DCT on one line of coefficients
pub fn inverse_line(rotations: &GivensRotations, block: &mut [f64]) {
    rotations.inverse(block);
    fast_idct(block);
}

#[cfg(test)]
pub(crate) fn forward_line(rotations: &GivensRotations, block: &mut [f64]) {
    dct(block);
    rotations.forward(block);
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < 1e-9, "index {i}: {a} != {e}");
        }
    }

    fn sample_block(n: usize) -> Vec<f64> {
        (0..n).map(|i| ((i * 37 + 11) % 23) as f64 - 9.5).collect()
    }

    #[test]
    fn test_degree_range() {
        assert_eq!(check_degree(2, MAX_DEGREE).expect("Test operation should succeed"), 4);
        assert_eq!(check_degree(12, MAX_DEGREE).expect("Test operation should succeed"), 4096);
        assert_eq!(check_degree(1, MAX_DEGREE).unwrap_err().kind(), ErrorKind::Format);
        assert_eq!(check_degree(9, 8).unwrap_err().kind(), ErrorKind::Format);
    }

    #[test]
    fn test_idct_inverts_dct() {
        for degree in [2u32, 3, 4, 6, 9] {
            let original = sample_block(1 << degree);
            let mut block = original.clone();
            dct(&mut block);
            fast_idct(&mut block);
            assert_close(&block, &original);
        }
    }

    #[test]
    fn test_idct_of_dc_is_flat() {
        let mut block = vec![0.0; 8];
        block[0] = 16.0;
        fast_idct(&mut block);
        assert_close(&block, &[2.0; 8]);
    }

    #[test]
    fn test_givens_leaves_even_indices() {
        let rotations = GivensRotations::new(16);
        let original = sample_block(16);
        let mut block = original.clone();
        rotations.forward(&mut block);
        for i in (0..16).step_by(2) {
            assert_eq!(block[i], original[i]);
        }
        rotations.inverse(&mut block);
        assert_close(&block, &original);

        let energy = |b: &[f64]| b.iter().map(|x| x * x).sum::<f64>();
        let mut rotated = original.clone();
        rotations.forward(&mut rotated);
        assert!((energy(&rotated) - energy(&original)).abs() < 1e-9);
    }

    #[test]
    fn test_plot_and_lot_invert() {
        let original = sample_block(8);
        let mut block = original.clone();
        fast_plot(&mut block);
        fast_iplot(&mut block);
        assert_close(&block, &original);

        let mut encode_carry = vec![0.0; 4];
        let mut decode_carry = vec![0.0; 4];
        for round in 0..3 {
            let target: Vec<f64> = sample_block(8).iter().map(|x| x * f64::from(round + 1)).collect();
            let mut block = target.clone();
            fast_lot(&mut encode_carry, &mut block);
            fast_ilot(&mut decode_carry, &mut block);
            assert_close(&block, &target);
        }
    }

    #[test]
    fn test_quantum_table() {
        // All nibbles zero: every ratio is one.
        let flat = QuantumTable::new(8, 0, 512);
        assert!((0..8).all(|band| flat.step(band) == 2.0));

        // Ratio 2 at the origin falling to 1 at length / 16.
        let table = QuantumTable::new(32, 0x0000_0002, 256);
        assert_eq!(table.step(0), 2.0);
        assert_eq!(table.step(1), 1.5);
        assert_eq!(table.step(2), 1.0);
        assert_eq!(table.step(31), 1.0);

        // Last breakpoint holds to the end.
        let tail = QuantumTable::new(16, 0x4000_0000, 256);
        assert_eq!(tail.step(12), 4.0);
        assert_eq!(tail.step(15), 4.0);
        assert_eq!(tail.step(10), 2.5);

        let mut out = [0.0; 16];
        let symbols: Vec<i32> = (0..16).map(|i| i - 8).collect();
        QuantumTable::new(4, 0x0000_0002, 256).dequantize_square(&symbols, &mut out);
        // Band of (u, v) is max(u, v); bands 0 and 1 carry 2.0 and 1.0.
        assert_eq!(out[0], -16.0);
        assert_eq!(out[5], -3.0);
        assert_eq!(out[1], -7.0);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_to_i16(2.5), 3);
        assert_eq!(round_to_i16(-2.5), -3);
        assert_eq!(round_to_i16(1e9), i16::MAX);
        assert_eq!(round_to_i16(-1e9), i16::MIN);
        assert_eq!(round_to_u8(-0.4), 0);
        assert_eq!(round_to_u8(254.5), 255);
        assert_eq!(round_to_u8(300.0), 255);
    }
}
