//! Keyed name hashes
//!
//! Archive indices store a 32-bit hash in place of (or next to) each entry
//! name. The same hash seeds per-entry cipher keys, so every scheme carries its
//! own recurrence:
//!
//! - [`NekoNameHash`] folds each byte through a 256-entry substitution table
//!   and multiplies by a fixed constant.
//! - [`Adler32Hash`] is the XP3 entry hash, an Adler-32 whose initial state is
//!   the seed.
//!
//! All implementations are pure functions of `(seed, bytes)`.
//!
//! # Examples
//!
//! ```
//! use gamearc_crypto::hash::{Adler32Hash, KeyedHash};
//!
//! assert_eq!(Adler32Hash.hash(1, b"abc"), 0x024d_0127);
//! ```

/// Hash function seeded by an archive key
pub trait KeyedHash {
    /// Hash `bytes` starting from `seed`
    fn hash(&self, seed: u32, bytes: &[u8]) -> u32;

    /// Hash a name given as a string
    fn hash_name(&self, seed: u32, name: &str) -> u32 {
        self.hash(seed, name.as_bytes())
    }
}

/// 256-entry byte substitution table
///
/// Tables are per-title key material. The identity table is the neutral
/// element and is what callers get from [`SubstitutionTable::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionTable([u8; 256]);

impl SubstitutionTable {
    /// Identity mapping
    #[must_use]
    pub const fn identity() -> Self {
        let mut table = [0u8; 256];
        let mut i = 0;
        while i < 256 {
            table[i] = i as u8;
            i += 1;
        }
        Self(table)
    }

    /// Wrap an existing table
    #[must_use]
    pub const fn new(table: [u8; 256]) -> Self {
        Self(table)
    }

    /// Build a table from a slice, which must be exactly 256 bytes
    pub fn from_slice(bytes: &[u8]) -> crate::CryptoResult<Self> {
        let table: [u8; 256] = bytes
            .try_into()
            .map_err(|_| crate::CryptoError::InvalidKeySize {
                expected: 256,
                actual: bytes.len(),
            })?;
        Ok(Self(table))
    }

    /// Substitute one byte
    #[inline]
    #[must_use]
    pub const fn map(&self, byte: u8) -> u8 {
        self.0[byte as usize]
    }

    /// Whether every byte maps to a distinct value
    #[must_use]
    pub fn is_permutation(&self) -> bool {
        let mut seen = [false; 256];
        for &b in &self.0 {
            if seen[b as usize] {
                return false;
            }
            seen[b as usize] = true;
        }
        true
    }
}

impl Default for SubstitutionTable {
    fn default() -> Self {
        Self::identity()
    }
}

/// NekoPack entry name hash
///
/// `h = 0x0100_002A * (table[b] ^ h)` for every byte `b`, starting from the
/// archive seed.
#[derive(Debug, Clone, Default)]
pub struct NekoNameHash {
    table: SubstitutionTable,
}

impl NekoNameHash {
    /// Multiplier applied after every byte
    pub const MULTIPLIER: u32 = 0x0100_002A;

    /// Create a hasher over a title's substitution table
    #[must_use]
    pub const fn new(table: SubstitutionTable) -> Self {
        Self { table }
    }

    /// The substitution table in use
    #[must_use]
    pub const fn table(&self) -> &SubstitutionTable {
        &self.table
    }
}

impl KeyedHash for NekoNameHash {
    fn hash(&self, seed: u32, bytes: &[u8]) -> u32 {
        bytes.iter().fold(seed, |h, &b| {
            Self::MULTIPLIER.wrapping_mul(u32::from(self.table.map(b)) ^ h)
        })
    }
}

/// XP3 entry hash (Adler-32 with a caller-chosen initial state)
///
/// Seed `1` gives the standard Adler-32.
#[derive(Debug, Clone, Copy, Default)]
pub struct Adler32Hash;

impl Adler32Hash {
    const MOD: u32 = 65521;
    // Largest run before the sums can overflow u32
    const NMAX: usize = 5552;
}

impl KeyedHash for Adler32Hash {
    fn hash(&self, seed: u32, bytes: &[u8]) -> u32 {
        let mut a = seed & 0xFFFF;
        let mut b = seed >> 16;
        for chunk in bytes.chunks(Self::NMAX) {
            for &byte in chunk {
                a += u32::from(byte);
                b += a;
            }
            a %= Self::MOD;
            b %= Self::MOD;
        }
        (b << 16) | a
    }
}
