//! Offset-salted Camellia-128
//!
//! Some archives run Camellia as a keyed permutation over 16-byte blocks whose
//! physical position salts the input: before the standard block decryption,
//! each big-endian 32-bit word of the ciphertext is rotated by
//! `((block_offset >> 4) & 0xF) + 16` bits, to the left for words 0 and 2 and
//! to the right for words 1 and 3. The block cipher itself is the RustCrypto
//! `camellia` implementation.
//!
//! # Examples
//!
//! ```
//! use gamearc_crypto::camellia::CamelliaCipher;
//!
//! let cipher = CamelliaCipher::new(&[0u8; 16]).expect("16-byte key");
//! let mut data = [0u8; 32];
//! cipher.decrypt(0x400, &mut data, 0, 32).expect("range is in bounds");
//! ```

use std::fmt;

use camellia::Camellia128;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt, KeyInit};

use crate::error::{CryptoError, CryptoResult, checked_range};

/// Camellia block size
pub const BLOCK_SIZE: usize = 16;

/// Camellia-128 keyed permutation with offset salting
pub struct CamelliaCipher {
    inner: Camellia128,
}

impl fmt::Debug for CamelliaCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CamelliaCipher").finish_non_exhaustive()
    }
}

impl CamelliaCipher {
    /// Create a cipher from a 16-byte key
    pub fn new(key: &[u8]) -> CryptoResult<Self> {
        let inner = Camellia128::new_from_slice(key).map_err(|_| CryptoError::InvalidKeySize {
            expected: BLOCK_SIZE,
            actual: key.len(),
        })?;
        Ok(Self { inner })
    }

    const fn salt(block_offset: u64) -> u32 {
        ((block_offset >> 4) & 0x0F) as u32 + 16
    }

    /// Rotate the four words of `block`, left for even words when `left` is set
    fn rotate_words(block: &mut [u8], rotation: u32, left: bool) {
        for (n, word) in block.chunks_exact_mut(4).enumerate() {
            let value = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
            let value = if (n % 2 == 0) == left {
                value.rotate_left(rotation)
            } else {
                value.rotate_right(rotation)
            };
            word.copy_from_slice(&value.to_be_bytes());
        }
    }

    /// Decrypt the 16-byte block at `buffer[index..]`, salted by `block_offset`
    pub fn decrypt_block(&self, block_offset: u64, buffer: &mut [u8], index: usize) -> CryptoResult<()> {
        let range = checked_range(buffer.len(), index, BLOCK_SIZE)?;
        let block = &mut buffer[range];

        Self::rotate_words(block, Self::salt(block_offset), true);
        self.inner.decrypt_block(GenericArray::from_mut_slice(block));
        Ok(())
    }

    /// Inverse of [`CamelliaCipher::decrypt_block`]
    pub fn encrypt_block(&self, block_offset: u64, buffer: &mut [u8], index: usize) -> CryptoResult<()> {
        let range = checked_range(buffer.len(), index, BLOCK_SIZE)?;
        let block = &mut buffer[range];

        self.inner.encrypt_block(GenericArray::from_mut_slice(block));
        Self::rotate_words(block, Self::salt(block_offset), false);
        Ok(())
    }

    /// Decrypt `buffer[offset..offset + length]`, whose first block sits at
    /// physical position `base_offset`
    ///
    /// `length` is rounded down to a multiple of [`BLOCK_SIZE`].
    pub fn decrypt(
        &self,
        base_offset: u64,
        buffer: &mut [u8],
        offset: usize,
        length: usize,
    ) -> CryptoResult<()> {
        checked_range(buffer.len(), offset, length)?;
        let blocks = length / BLOCK_SIZE;
        for n in 0..blocks {
            let block_offset = base_offset.wrapping_add((n * BLOCK_SIZE) as u64);
            self.decrypt_block(block_offset, buffer, offset + n * BLOCK_SIZE)?;
        }
        Ok(())
    }
}
