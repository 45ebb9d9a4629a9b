//! Keystream helpers of the WARC stage 1 cipher
//!
//! These keep a fixed floating point evaluation order, operation by
//! operation. Reordering any expression changes the derived key byte.

use std::f64::consts::PI;

use super::{RegionImage, Rng};
use crate::error::{CryptoError, CryptoResult};

const RAND_SCALE: f64 = 4_294_967_296.0;

/// Series/asymptotic expansion keyed by the first ciphertext byte
pub(crate) fn decrypt_helper1(a: f64) -> f64 {
    if a < 0.0 {
        return -decrypt_helper1(-a);
    }

    if a < 18.0 {
        let mut v0 = a;
        let mut v1 = a;
        let v2 = -(a * a);
        let mut j = 3;
        while j < 1000 {
            v1 *= v2 / f64::from(j * (j - 1));
            v0 += v1 / f64::from(j);
            #[allow(clippy::float_cmp)]
            if v0 == v2 {
                break;
            }
            j += 2;
        }
        return v0;
    }

    let mut flags = 0u32;
    let mut v0_l = 0.0;
    let mut v1 = 0.0;
    let mut div = 1.0 / a;
    let mut v1_h = 2.0;
    let mut v0_h = 2.0;
    let mut v1_l = 0.0;
    let mut v0 = 0.0;
    let mut i = 0u32;

    while flags != 0xF {
        v0 += div;
        i += 1;
        div *= f64::from(i) / a;
        if v0 < v0_h {
            v0_h = v0;
        } else {
            flags |= 1;
        }

        v1 += div;
        i += 1;
        div *= f64::from(i) / a;
        if v1 < v1_h {
            v1_h = v1;
        } else {
            flags |= 2;
        }

        v0 -= div;
        i += 1;
        div *= f64::from(i) / a;
        if v0 > v0_l {
            v0_l = v0;
        } else {
            flags |= 4;
        }

        v1 -= div;
        i += 1;
        div *= f64::from(i) / a;
        if v1 > v1_l {
            v1_l = v1;
        } else {
            flags |= 8;
        }
    }

    ((PI - a.cos() * (v0_l + v0_h)) - (a.sin() * (v1_l + v1_h))) / 2.0
}

/// Gamma-variate rejection sampler driven by the archive RNG
pub(crate) fn decrypt_helper2<R: Rng>(a: f64, rng: &mut R) -> u32 {
    let mut uniform = || f64::from(rng.next_rand()) / RAND_SCALE;
    let v3;

    if a > 1.0 {
        let v0 = (a * 2.0 - 1.0).sqrt();
        loop {
            let v1 = 1.0 - uniform();
            let mut v2 = 2.0 * uniform() - 1.0;
            if v1 * v1 + v2 * v2 > 1.0 {
                continue;
            }

            v2 /= v1;
            let candidate = v2 * v0 + a - 1.0;
            if candidate <= 0.0 {
                continue;
            }

            let log_ratio = (a - 1.0) * (candidate / (a - 1.0)).ln() - v2 * v0;
            if log_ratio < -50.0 {
                continue;
            }

            if uniform() <= log_ratio.exp() * (v2 * v2 + 1.0) {
                v3 = candidate;
                break;
            }
        }
    } else {
        let e = 1.0f64.exp();
        // The threshold is reused as the sample after the first round
        let mut threshold = e / (a + e);
        loop {
            let v1 = uniform();
            let v2 = uniform();
            let accept = if v1 < threshold {
                threshold = v2.powf(1.0 / a);
                (-threshold).exp()
            } else {
                threshold = 1.0 - v2.ln();
                threshold.powf(a - 1.0)
            };
            if uniform() < accept {
                break;
            }
        }
        v3 = threshold;
    }

    (v3 * 256.0) as u32
}

/// Float-bit remix of the image-derived factor (archive versions 1.6+)
pub(crate) fn decrypt_helper3(key: u32) -> u32 {
    let scaled = 1.5f32 * (key & 0xFF) as f32 + 0.1f32;
    let bits = scaled.to_bits();
    (bits ^ (key >> 8).wrapping_mul(0x0003_43FD)).wrapping_add(key.rotate_left(13))
}

/// Number of leading bytes rewritten by [`decrypt_helper4`]
pub(crate) const HELPER4_XOR_LEN: usize = 0x28;
const HELPER4_HASH_START: usize = 0x28;
const HELPER4_HASH_LEN: usize = 0x40;

/// Hash-keyed XOR over the first 0x28 bytes of the 0x80-byte helper window
///
/// The key is a SHA-1 style compression of the following 0x40 bytes, seeded by
/// the scheme's helper key and extended with five pixels of the region image.
/// The hashed bytes are not modified, so the transform is its own inverse.
pub(crate) fn decrypt_helper4(
    data: &mut [u8],
    helper_key: &[u32; 5],
    region: &RegionImage,
) -> CryptoResult<()> {
    if data.len() < HELPER4_HASH_START + HELPER4_HASH_LEN {
        return Err(CryptoError::InvalidScheme(format!(
            "helper window needs {} bytes, got {}",
            HELPER4_HASH_START + HELPER4_HASH_LEN,
            data.len()
        )));
    }

    let mut schedule = [0u32; 0x50];
    for (i, chunk) in data[HELPER4_HASH_START..HELPER4_HASH_START + HELPER4_HASH_LEN]
        .chunks_exact(4)
        .enumerate()
    {
        schedule[i] = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    for i in 0x10..0x50 {
        schedule[i] = (schedule[i - 16] ^ schedule[i - 14] ^ schedule[i - 8] ^ schedule[i - 3])
            .rotate_left(1);
    }

    let [mut k0, mut k1, mut k2, mut k3, mut k4] = *helper_key;
    for (j, &word) in schedule.iter().enumerate() {
        let (f, c) = match j {
            0x00..0x10 => (k1 ^ k2 ^ k3, 0),
            0x10..0x20 => ((k1 & k2) | (k3 & !k1), 0x5A82_7999),
            0x20..0x30 => (k3 ^ (k1 | !k2), 0x6ED9_EBA1),
            0x30..0x40 => ((k1 & k3) | (k2 & !k3), 0x8F1B_BCDC),
            _ => (k1 ^ (k2 | !k3), 0xA953_FD4E),
        };
        let next = word
            .wrapping_add(k4)
            .wrapping_add(f)
            .wrapping_add(c)
            .wrapping_add(k0.rotate_left(5));
        k4 = k3;
        k3 = k2;
        k2 = k1.rotate_right(2);
        k1 = k0;
        k0 = next;
    }

    let mut key = [0u32; 10];
    for (slot, (&base, delta)) in key
        .iter_mut()
        .zip(helper_key.iter().zip([k0, k1, k2, k3, k4]))
    {
        *slot = base.wrapping_add(delta);
    }
    for i in 0..5 {
        let pixel = region.pixel(key[i], key[(i + 1) % 5])?;
        key[5 + i] = pixel ^ key[i].rotate_left(5 * i as u32 + 3);
    }

    for (chunk, k) in data[..HELPER4_XOR_LEN].chunks_exact_mut(4).zip(key) {
        let value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ k;
        chunk.copy_from_slice(&value.to_le_bytes());
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::warc::RioRng;

    #[test]
    fn test_helper1_is_odd() {
        for a in [1.0, 5.0, 17.0, 25.0, 100.0] {
            let pos = decrypt_helper1(a);
            let neg = decrypt_helper1(-a);
            assert!((pos + neg).abs() < f64::EPSILON);
        }
        assert!(decrypt_helper1(0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_helper1_series_matches_sine_integral() {
        // The small-argument branch is the Si(x) Taylor series
        let si_one = 0.946_083_070_367_183;
        assert!((decrypt_helper1(1.0) - si_one).abs() < 1e-12);
    }

    #[test]
    fn test_helper1_large_argument_near_half_pi() {
        let value = decrypt_helper1(60.0);
        assert!((value - std::f64::consts::FRAC_PI_2).abs() < 0.05);
    }

    #[test]
    fn test_helper2_is_deterministic() {
        let mut a = RioRng::default();
        let mut b = RioRng::default();
        a.seed(1234);
        b.seed(1234);
        assert_eq!(decrypt_helper2(45.0, &mut a), decrypt_helper2(45.0, &mut b));
        assert_eq!(a.peek(), b.peek());
    }

    #[test]
    fn test_helper2_zero_token() {
        let mut rng = RioRng::default();
        rng.seed(99);
        assert_eq!(decrypt_helper2(0.0, &mut rng), 0);
    }

    #[test]
    fn test_helper4_is_involution() {
        let region = RegionImage::new(4, 4, (0..48).collect()).expect("Test operation should succeed");
        let key = [0x90B9_89AF, 0x60BA_6AB8, 0x86B9_E6B9, 0xF3B9_99B9, 0xF2B9_BCA8];
        let original: Vec<u8> = (0..0x80u32).map(|i| (i * 7 + 3) as u8).collect();

        let mut data = original.clone();
        decrypt_helper4(&mut data, &key, &region).expect("Test operation should succeed");
        assert_ne!(data[..HELPER4_XOR_LEN], original[..HELPER4_XOR_LEN]);
        assert_eq!(data[HELPER4_XOR_LEN..], original[HELPER4_XOR_LEN..]);

        decrypt_helper4(&mut data, &key, &region).expect("Test operation should succeed");
        assert_eq!(data, original);
    }

    #[test]
    fn test_helper4_short_window() {
        let region = RegionImage::new(1, 1, vec![1, 2, 3]).expect("Test operation should succeed");
        let mut data = [0u8; 0x40];
        assert!(decrypt_helper4(&mut data, &[0; 5], &region).is_err());
    }
}
