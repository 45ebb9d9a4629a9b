//! Entry ciphers and keyed name hashes for visual-novel game archives.
//!
//! This crate provides:
//! - NekoPack version 1 word cipher and version 2 XCode cipher
//! - ShiinaRio WARC index and entry decryption, including per-title schemes
//!   loaded from JSON records
//! - XP3 byte ciphers and a segmented, decrypting entry stream
//! - Offset-salted Camellia-128
//! - Keyed name hashes and known-name dictionaries
//!
//! Container parsers call [`decrypt`] with a [`SchemeId`] and matching
//! [`KeyMaterial`]; every cipher decrypts in place and never reads outside the
//! requested range.
//!
//! # Examples
//!
//! ```
//! use gamearc_crypto::{KeyMaterial, SchemeId, decrypt};
//! use gamearc_crypto::xp3::{Xp3EntryKey, XorCrypt};
//!
//! let crypt = XorCrypt::new(0x55);
//! let key = KeyMaterial::Xp3 {
//!     crypt: &crypt,
//!     entry: Xp3EntryKey::new(0),
//!     position: 0,
//! };
//! let mut data = [0x55u8; 4];
//! decrypt(SchemeId::Xp3, &key, &mut data, 0, 4).expect("in-range decrypt");
//! assert_eq!(data, [0; 4]);
//! ```

#![warn(missing_docs)]

pub mod camellia;
pub mod error;
pub mod hash;
pub mod names;
pub mod neko;
pub mod scheme;
pub mod warc;
pub mod xcode;
pub mod xp3;

pub use camellia::CamelliaCipher;
pub use error::{CryptoError, CryptoResult};
pub use hash::{Adler32Hash, KeyedHash, NekoNameHash, SubstitutionTable};
pub use names::{KnownNames, NameDictionary};
pub use neko::NekoCipher;
pub use scheme::{KeyMaterial, SchemeId, decrypt};
pub use warc::{WarcDecoder, WarcScheme};
pub use xcode::NekoXCode;
pub use xp3::{Xp3Crypt, Xp3EntryKey, Xp3Scheme};
