//! Scheme dispatch for container parsers
//!
//! Container parsers know which cipher an archive uses and hold the key
//! material for it. [`decrypt`] routes a byte range to the matching cipher and
//! rejects key material that belongs to a different scheme.

use tracing::debug;

use crate::camellia::CamelliaCipher;
use crate::error::{CryptoError, CryptoResult, checked_range};
use crate::neko::NekoCipher;
use crate::warc::{WarcDecoder, WarcScheme};
use crate::xcode::NekoXCode;
use crate::xp3::{Xp3Crypt, Xp3EntryKey};

/// Cipher family applied to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemeId {
    /// NekoPack version 1 word cipher
    NekoPack,
    /// NekoPack version 2 XCode cipher
    NekoXCode,
    /// ShiinaRio WARC entry chain
    ShiinaRio,
    /// XP3 entry byte cipher
    Xp3,
    /// Offset-salted Camellia
    Camellia,
}

impl SchemeId {
    /// Human readable scheme name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NekoPack => "NekoPack",
            Self::NekoXCode => "NekoPack XCode",
            Self::ShiinaRio => "ShiinaRio",
            Self::Xp3 => "XP3",
            Self::Camellia => "Camellia",
        }
    }
}

/// Key material for one decrypt call
#[derive(Debug, Clone, Copy)]
pub enum KeyMaterial<'a> {
    /// Entry name hash for NekoPack version 1
    NekoHash(u32),
    /// Archive cipher and entry key for NekoPack version 2
    NekoXCode {
        /// Cipher built from the archive's initial key
        cipher: &'a NekoXCode,
        /// Entry key
        key: u32,
    },
    /// Per-title scheme record and entry flags
    Warc {
        /// Scheme record
        scheme: &'a WarcScheme,
        /// Entry flag word from the index
        flags: u32,
    },
    /// XP3 cipher, entry hash and absolute offset of the first byte
    Xp3 {
        /// Cipher
        crypt: &'a dyn Xp3Crypt,
        /// Entry key
        entry: Xp3EntryKey,
        /// Absolute entry offset of `buffer[offset]`
        position: u64,
    },
    /// Camellia cipher and physical offset of the first block
    Camellia {
        /// Keyed cipher
        cipher: &'a CamelliaCipher,
        /// Physical offset of `buffer[offset]`
        block_offset: u64,
    },
}

impl KeyMaterial<'_> {
    /// Scheme this key material drives
    #[must_use]
    pub const fn scheme(&self) -> SchemeId {
        match self {
            Self::NekoHash(_) => SchemeId::NekoPack,
            Self::NekoXCode { .. } => SchemeId::NekoXCode,
            Self::Warc { .. } => SchemeId::ShiinaRio,
            Self::Xp3 { .. } => SchemeId::Xp3,
            Self::Camellia { .. } => SchemeId::Camellia,
        }
    }
}

/// Decrypt `buffer[offset..offset + length]` in place
///
/// Word and block ciphers round `length` down to their block size and leave
/// the remainder untouched. The WARC chain treats the range as one complete
/// entry.
///
/// # Examples
///
/// ```
/// use gamearc_crypto::{KeyMaterial, SchemeId, decrypt};
///
/// let mut data = vec![0u8; 16];
/// decrypt(SchemeId::NekoPack, &KeyMaterial::NekoHash(0x1234), &mut data, 0, 16)
///     .expect("matching scheme");
/// ```
pub fn decrypt(
    scheme: SchemeId,
    key: &KeyMaterial<'_>,
    buffer: &mut [u8],
    offset: usize,
    length: usize,
) -> CryptoResult<()> {
    if key.scheme() != scheme {
        return Err(CryptoError::KeyMismatch {
            expected: scheme.name(),
            actual: key.scheme().name(),
        });
    }
    debug!(scheme = scheme.name(), offset, length, "decrypting range");

    match *key {
        KeyMaterial::NekoHash(hash) => NekoCipher::from_hash(hash).decrypt(buffer, offset, length),
        KeyMaterial::NekoXCode { cipher, key } => cipher.decrypt(key, buffer, offset, length),
        KeyMaterial::Warc { scheme, flags } => {
            let range = checked_range(buffer.len(), offset, length)?;
            WarcDecoder::new(scheme)?.decrypt_entry(&mut buffer[range], flags)
        }
        KeyMaterial::Xp3 {
            crypt,
            entry,
            position,
        } => {
            let range = checked_range(buffer.len(), offset, length)?;
            crypt.decrypt(&entry, position, &mut buffer[range]);
            Ok(())
        }
        KeyMaterial::Camellia {
            cipher,
            block_offset,
        } => cipher.decrypt(block_offset, buffer, offset, length),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::xp3::XorCrypt;

    #[test]
    fn test_mismatched_key_rejected() {
        let mut data = [0u8; 8];
        let err = decrypt(SchemeId::Xp3, &KeyMaterial::NekoHash(1), &mut data, 0, 8).unwrap_err();
        assert!(matches!(
            err,
            CryptoError::KeyMismatch {
                expected: "XP3",
                actual: "NekoPack"
            }
        ));
        assert_eq!(data, [0u8; 8]);
    }

    #[test]
    fn test_xp3_dispatch_uses_range() {
        let crypt = XorCrypt::new(0xFF);
        let key = KeyMaterial::Xp3 {
            crypt: &crypt,
            entry: Xp3EntryKey::new(0),
            position: 0,
        };
        let mut data = [0u8; 6];
        decrypt(SchemeId::Xp3, &key, &mut data, 2, 3).expect("Test operation should succeed");
        assert_eq!(data, [0, 0, 0xFF, 0xFF, 0xFF, 0]);
        assert!(decrypt(SchemeId::Xp3, &key, &mut data, 4, 3).is_err());
    }

    #[test]
    fn test_neko_dispatch_matches_direct_call() {
        let mut direct = (0..24u8).collect::<Vec<_>>();
        let mut routed = direct.clone();
        NekoCipher::from_hash(77)
            .decrypt(&mut direct, 0, 24)
            .expect("Test operation should succeed");
        decrypt(SchemeId::NekoPack, &KeyMaterial::NekoHash(77), &mut routed, 0, 24)
            .expect("Test operation should succeed");
        assert_eq!(direct, routed);
    }

    #[test]
    fn test_xcode_and_camellia_dispatch() {
        let xcode = NekoXCode::new(3);
        let mut direct = vec![0x11u8; 16];
        let mut routed = direct.clone();
        xcode.decrypt(5, &mut direct, 0, 16).expect("Test operation should succeed");
        decrypt(
            SchemeId::NekoXCode,
            &KeyMaterial::NekoXCode { cipher: &xcode, key: 5 },
            &mut routed,
            0,
            16,
        )
        .expect("Test operation should succeed");
        assert_eq!(direct, routed);

        let camellia = CamelliaCipher::new(&[1u8; 16]).expect("Test operation should succeed");
        let mut direct = vec![0x22u8; 32];
        let mut routed = direct.clone();
        camellia.decrypt(0x40, &mut direct, 0, 32).expect("Test operation should succeed");
        decrypt(
            SchemeId::Camellia,
            &KeyMaterial::Camellia { cipher: &camellia, block_offset: 0x40 },
            &mut routed,
            0,
            32,
        )
        .expect("Test operation should succeed");
        assert_eq!(direct, routed);
    }
}
