//! Stage 2 and stage 3 of the WARC entry cipher

use crc::{CRC_16_IBM_3740, CRC_32_MPEG_2, Crc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{CryptoError, CryptoResult};

/// Minimum entry size for the CRC stage
pub const CRC_CRYPT_MIN_LEN: usize = 0x400;
const CRC_SPAN: usize = 0x100;
const TABLE_MIN_LEN: usize = 0x2000;

/// MSB-first CRC32 (polynomial 0x04C11DB7, no final XOR)
const CRC32_MSB: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// MSB-first 16-bit LFSR (polynomial 0x1021, initial 0xFFFF)
const LFSR16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// XOR bytes `0x100..0x200` with table words selected by bytes `0..0x100`
///
/// Buffers shorter than [`CRC_CRYPT_MIN_LEN`] are left untouched. The selector
/// bytes are never modified, so the same call encrypts and decrypts.
pub fn crc_crypt(data: &mut [u8], table: &[u8]) -> CryptoResult<()> {
    if data.len() < CRC_CRYPT_MIN_LEN {
        return Ok(());
    }
    if table.len() < TABLE_MIN_LEN {
        return Err(CryptoError::InvalidKeySize {
            expected: TABLE_MIN_LEN,
            actual: table.len(),
        });
    }

    let crc = CRC32_MSB.checksum(&data[..CRC_SPAN]);
    let (head, tail) = data.split_at_mut(CRC_SPAN);
    for (selector, target) in head.chunks_exact(4).zip(tail.chunks_exact_mut(4)) {
        let src = (u32::from_le_bytes([selector[0], selector[1], selector[2], selector[3]])
            & 0x1FFC) as usize;
        let key = u32::from_le_bytes([table[src], table[src + 1], table[src + 2], table[src + 3]])
            ^ crc;
        let value = u32::from_le_bytes([target[0], target[1], target[2], target[3]]) ^ key;
        target.copy_from_slice(&value.to_le_bytes());
    }
    trace!(crc, "warc crc stage");
    Ok(())
}

/// 16-bit MSB-first LFSR checksum (polynomial 0x1021, initial 0xFFFF)
#[must_use]
pub fn lfsr_checksum(data: &[u8]) -> u16 {
    LFSR16.checksum(data)
}

/// Title-specific final stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtraCrypt {
    /// No third stage
    #[default]
    None,
    /// XOR the two trailing bytes with an LFSR checksum of everything before
    /// them, for entries whose flags contain `flag_mask`
    TrailerChecksum {
        /// Entry flag bits that enable the stage
        flag_mask: u32,
        /// Oldest scheme version using the stage
        min_scheme_version: u32,
    },
}

impl ExtraCrypt {
    /// Apply the stage; it is its own inverse
    pub fn apply(&self, data: &mut [u8], flags: u32, scheme_version: u32) {
        let Self::TrailerChecksum {
            flag_mask,
            min_scheme_version,
        } = *self
        else {
            return;
        };
        if scheme_version < min_scheme_version || flags & flag_mask != flag_mask || data.len() < 4
        {
            return;
        }

        let split = data.len() - 2;
        let sum = lfsr_checksum(&data[..split]).to_le_bytes();
        data[split] ^= sum[0];
        data[split + 1] ^= sum[1];
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_msb_reference() {
        // CRC-32/MPEG-2 check value
        assert_eq!(CRC32_MSB.checksum(b"123456789"), 0x0376_E6E7);
        assert_eq!(CRC32_MSB.checksum(b""), 0xFFFF_FFFF);
    }

    #[test]
    fn test_lfsr_checksum_reference() {
        // CRC-16/CCITT-FALSE check value
        assert_eq!(lfsr_checksum(b"123456789"), 0x29B1);
        assert_eq!(lfsr_checksum(b""), 0xFFFF);
    }

    #[test]
    fn test_crc_crypt_involution() {
        let table: Vec<u8> = (0..0x2000u32).map(|i| (i ^ (i >> 5)) as u8).collect();
        let original: Vec<u8> = (0..0x400u32).map(|i| (i * 3) as u8).collect();
        let mut data = original.clone();
        crc_crypt(&mut data, &table).expect("Test operation should succeed");
        assert_eq!(data[..0x100], original[..0x100]);
        assert_ne!(data[0x100..0x200], original[0x100..0x200]);
        assert_eq!(data[0x200..], original[0x200..]);
        crc_crypt(&mut data, &table).expect("Test operation should succeed");
        assert_eq!(data, original);
    }

    #[test]
    fn test_crc_crypt_zero_block() {
        // Zero selectors and a zero table leave only the CRC of 0x100 zero bytes
        let mut data = vec![0u8; 0x400];
        crc_crypt(&mut data, &[0u8; 0x2000]).expect("Test operation should succeed");
        for word in data[0x100..0x200].chunks_exact(4) {
            assert_eq!(word, 0xE55E_964Fu32.to_le_bytes());
        }
        assert!(data[0x200..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_crc_crypt_short_input_untouched() {
        let mut data = vec![9u8; 0x3FF];
        crc_crypt(&mut data, &[]).expect("Test operation should succeed");
        assert!(data.iter().all(|&b| b == 9));
    }

    #[test]
    fn test_crc_crypt_small_table() {
        let mut data = vec![0u8; 0x400];
        assert!(matches!(
            crc_crypt(&mut data, &[0u8; 16]),
            Err(CryptoError::InvalidKeySize { expected: 0x2000, actual: 16 })
        ));
    }

    #[test]
    fn test_trailer_checksum_gating() {
        let stage = ExtraCrypt::TrailerChecksum {
            flag_mask: 0x10,
            min_scheme_version: 2390,
        };
        let original = b"payload bytes".to_vec();

        let mut data = original.clone();
        stage.apply(&mut data, 0, 2500);
        assert_eq!(data, original);
        stage.apply(&mut data, 0x10, 2300);
        assert_eq!(data, original);

        stage.apply(&mut data, 0x11, 2500);
        assert_ne!(data, original);
        assert_eq!(data[..11], original[..11]);
        stage.apply(&mut data, 0x11, 2500);
        assert_eq!(data, original);
    }
}
