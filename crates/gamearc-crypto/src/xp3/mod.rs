//! XP3 entry ciphers
//!
//! Kirikiri titles encrypt XP3 entries with small byte ciphers keyed by the
//! entry's stored Adler-32 hash. Each cipher decrypts a single byte at an
//! absolute entry offset, so entries can be read through the segmented stream
//! in [`stream`] without materializing them.

pub mod stream;

use serde::{Deserialize, Serialize};

pub use stream::{Xp3Segment, Xp3SegmentReader};

/// Per-entry key material stored in the XP3 index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Xp3EntryKey {
    /// Stored entry hash
    pub hash: u32,
}

impl Xp3EntryKey {
    /// Wrap a stored entry hash
    #[must_use]
    pub const fn new(hash: u32) -> Self {
        Self { hash }
    }
}

/// Byte cipher applied to XP3 entries
pub trait Xp3Crypt: Send + Sync + std::fmt::Debug {
    /// Decrypt one byte located at absolute entry offset `offset`
    fn decrypt_byte(&self, entry: &Xp3EntryKey, offset: u64, value: u8) -> u8;

    /// Decrypt `buffer`, whose first byte sits at absolute offset `offset`
    fn decrypt(&self, entry: &Xp3EntryKey, offset: u64, buffer: &mut [u8]) {
        for (pos, byte) in (offset..).zip(buffer.iter_mut()) {
            *byte = self.decrypt_byte(entry, pos, *byte);
        }
    }

    /// Short scheme name for logging
    fn name(&self) -> &'static str;
}

/// Unencrypted entries
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCrypt;

impl Xp3Crypt for NoCrypt {
    fn decrypt_byte(&self, _entry: &Xp3EntryKey, _offset: u64, value: u8) -> u8 {
        value
    }

    fn decrypt(&self, _entry: &Xp3EntryKey, _offset: u64, _buffer: &mut [u8]) {}

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Fixed single-byte XOR
#[derive(Debug, Clone, Copy)]
pub struct XorCrypt {
    key: u8,
}

impl XorCrypt {
    /// Create a cipher XORing every byte with `key`
    #[must_use]
    pub const fn new(key: u8) -> Self {
        Self { key }
    }
}

impl Xp3Crypt for XorCrypt {
    fn decrypt_byte(&self, _entry: &Xp3EntryKey, _offset: u64, value: u8) -> u8 {
        value ^ self.key
    }

    fn decrypt(&self, _entry: &Xp3EntryKey, _offset: u64, buffer: &mut [u8]) {
        for byte in buffer {
            *byte ^= self.key;
        }
    }

    fn name(&self) -> &'static str {
        "xor"
    }
}

/// XOR with the low byte of the entry hash
#[derive(Debug, Clone, Copy, Default)]
pub struct HashCrypt;

impl Xp3Crypt for HashCrypt {
    fn decrypt_byte(&self, entry: &Xp3EntryKey, _offset: u64, value: u8) -> u8 {
        value ^ entry.hash as u8
    }

    fn name(&self) -> &'static str {
        "hash"
    }
}

/// Rotate and XOR keyed by the entry hash
///
/// Hash bits 0..8 give the right rotation (`0x0F` when zero) and bits 8..16
/// the XOR key (`0xF0` when zero).
#[derive(Debug, Clone, Copy, Default)]
pub struct FlyingShineCrypt;

impl FlyingShineCrypt {
    const fn key(entry: &Xp3EntryKey) -> (u8, u32) {
        let shift = match entry.hash as u8 {
            0 => 0x0F,
            s => s,
        };
        let key = match (entry.hash >> 8) as u8 {
            0 => 0xF0,
            k => k,
        };
        (key, (shift & 7) as u32)
    }

    /// Inverse of [`Xp3Crypt::decrypt_byte`]
    #[must_use]
    pub const fn encrypt_byte(entry: &Xp3EntryKey, value: u8) -> u8 {
        let (key, shift) = Self::key(entry);
        value.rotate_left(shift) ^ key
    }
}

impl Xp3Crypt for FlyingShineCrypt {
    fn decrypt_byte(&self, entry: &Xp3EntryKey, _offset: u64, value: u8) -> u8 {
        let (key, shift) = Self::key(entry);
        (value ^ key).rotate_right(shift)
    }

    fn name(&self) -> &'static str {
        "flying-shine"
    }
}

/// Position-windowed XOR
///
/// The first [`OkibaCrypt::HEADER_LENGTH`] bytes are XORed with hash bits
/// 4..12. Later bytes cycle through the hash with the bytes of each 16-bit
/// half swapped, starting over at the end of the header.
#[derive(Debug, Clone, Copy, Default)]
pub struct OkibaCrypt;

impl OkibaCrypt {
    /// Bytes covered by the header key
    pub const HEADER_LENGTH: u64 = 0x65;

    const fn key_at(entry: &Xp3EntryKey, offset: u64) -> u8 {
        let hash = entry.hash;
        if offset < Self::HEADER_LENGTH {
            return (hash >> 4) as u8;
        }
        let swapped = ((hash & 0x00FF_0000) << 8)
            | ((hash & 0xFF00_0000) >> 8)
            | ((hash & 0x0000_FF00) >> 8)
            | ((hash & 0x0000_00FF) << 8);
        (swapped >> (8 * ((offset - Self::HEADER_LENGTH) & 3))) as u8
    }
}

impl Xp3Crypt for OkibaCrypt {
    fn decrypt_byte(&self, entry: &Xp3EntryKey, offset: u64, value: u8) -> u8 {
        value ^ Self::key_at(entry, offset)
    }

    fn name(&self) -> &'static str {
        "okiba"
    }
}

/// Position-dependent substitution through a keyed table
#[derive(Debug, Clone)]
pub struct SubstitutionCrypt {
    table: crate::hash::SubstitutionTable,
}

impl SubstitutionCrypt {
    /// Create a cipher from a per-title table
    #[must_use]
    pub const fn new(table: crate::hash::SubstitutionTable) -> Self {
        Self { table }
    }
}

impl Xp3Crypt for SubstitutionCrypt {
    fn decrypt_byte(&self, entry: &Xp3EntryKey, offset: u64, value: u8) -> u8 {
        self.table.map(value) ^ (entry.hash as u8).wrapping_add(offset as u8)
    }

    fn name(&self) -> &'static str {
        "substitution"
    }
}

/// Serializable selection of a built-in XP3 cipher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Xp3Scheme {
    /// [`NoCrypt`]
    None,
    /// [`XorCrypt`]
    Xor {
        /// XOR key
        key: u8,
    },
    /// [`HashCrypt`]
    Hash,
    /// [`FlyingShineCrypt`]
    FlyingShine,
    /// [`OkibaCrypt`]
    Okiba,
}

impl Xp3Scheme {
    /// Instantiate the cipher
    #[must_use]
    pub fn build(self) -> Box<dyn Xp3Crypt> {
        match self {
            Self::None => Box::new(NoCrypt),
            Self::Xor { key } => Box::new(XorCrypt::new(key)),
            Self::Hash => Box::new(HashCrypt),
            Self::FlyingShine => Box::new(FlyingShineCrypt),
            Self::Okiba => Box::new(OkibaCrypt),
        }
    }
}
