//! NekoPack word cipher (archive version 1)
//!
//! Entries are encrypted in 8-byte little-endian words. A 64-bit running key is
//! derived from the entry's 32-bit name hash; every word is XORed with the key
//! and the key then absorbs the ciphertext word through a packed add of four
//! 16-bit lanes. Decryption is therefore strictly sequential inside a buffer.
//!
//! # Examples
//!
//! ```
//! use gamearc_crypto::neko::NekoCipher;
//!
//! let cipher = NekoCipher::from_hash(0x1234_ABCD);
//! let mut data = vec![0u8; 16];
//! cipher.decrypt(&mut data, 0, 16).expect("range is in bounds");
//! ```

use crate::error::{CryptoResult, checked_range};

/// Word size processed by the cipher
pub const WORD_SIZE: usize = 8;

/// NekoPack version 1 cipher keyed by an entry hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NekoCipher {
    initial_key: u64,
}

impl NekoCipher {
    /// Derive the running key from a 32-bit entry hash
    #[must_use]
    pub const fn from_hash(hash: u32) -> Self {
        Self {
            initial_key: derive_key(hash),
        }
    }

    /// Start from an explicit 64-bit key
    #[must_use]
    pub const fn from_key(key: u64) -> Self {
        Self { initial_key: key }
    }

    /// Key used for the first word
    #[must_use]
    pub const fn initial_key(&self) -> u64 {
        self.initial_key
    }

    /// Decrypt `buffer[offset..offset + length]` in place
    ///
    /// `length` is rounded down to a multiple of [`WORD_SIZE`]; trailing bytes
    /// are left untouched.
    pub fn decrypt(&self, buffer: &mut [u8], offset: usize, length: usize) -> CryptoResult<()> {
        let range = checked_range(buffer.len(), offset, length)?;
        let mut key = self.initial_key;
        for word in buffer[range].chunks_exact_mut(WORD_SIZE) {
            let cipher_word = read_word(word);
            write_word(word, cipher_word ^ key);
            key = packed_add_u16(key, cipher_word);
        }
        Ok(())
    }
}

/// Fixed bit-mixing from a 32-bit hash to the 64-bit key
#[must_use]
pub const fn derive_key(hash: u32) -> u64 {
    let a = hash ^ hash.wrapping_add(0x5D58_8B65);
    let b = a ^ hash.wrapping_sub(0x359D_3E2A);
    let c = b ^ a.wrapping_sub(0x70E4_4324);
    let d = c ^ b.wrapping_add(0x6C07_8965);
    ((c as u64) << 32) | d as u64
}

/// Lane-wise wrapping add of four 16-bit lanes
#[must_use]
pub const fn packed_add_u16(lhs: u64, rhs: u64) -> u64 {
    // Mask off the top bit of every lane so carries cannot cross lanes
    const LOW: u64 = 0x7FFF_7FFF_7FFF_7FFF;
    const HIGH: u64 = !LOW;
    ((lhs & LOW) + (rhs & LOW)) ^ ((lhs ^ rhs) & HIGH)
}

fn read_word(bytes: &[u8]) -> u64 {
    let mut word = [0u8; WORD_SIZE];
    word.copy_from_slice(bytes);
    u64::from_le_bytes(word)
}

fn write_word(bytes: &mut [u8], value: u64) {
    bytes.copy_from_slice(&value.to_le_bytes());
}
