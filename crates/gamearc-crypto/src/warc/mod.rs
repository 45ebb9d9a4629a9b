//! ShiinaRio WARC cipher chain
//!
//! WARC archives encrypt both the index and every entry. Decryption runs up to
//! three stages, all keyed by the title's [`WarcScheme`]:
//!
//! 1. A rolling substitution over the first KiB. Its starting key position is
//!    derived from the two leading ciphertext bytes through a pair of floating
//!    point helpers and a byte picked out of the title's logo image. Schemes
//!    newer than 2350 additionally pass the first 0x80 bytes through a
//!    SHA-1 style helper keyed by a region image.
//! 2. When the scheme ships a decode table: a CRC32 of the first 0x100 bytes
//!    combined with table lookups, XORed over the next 0x100 bytes.
//! 3. A version-gated 16-bit LFSR checksum folded into the two trailing bytes.
//!
//! The index additionally gets XORed with its file offset and, from version
//! 1.7, with the inverted version number.

mod extra;
mod helper;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

pub use extra::{ExtraCrypt, crc_crypt, lfsr_checksum};

use crate::error::{CryptoError, CryptoResult};

/// Bytes covered by stage 1
pub const STAGE1_LIMIT: u32 = 1024;

/// Size of the fixed-width entry name in index records
pub const ENTRY_NAME_SIZE: usize = 0x10;

/// Linear congruential generator shared by all stages
#[derive(Debug, Default, Clone)]
pub struct RioRng(u32);

/// Random source used by the helper functions
pub trait Rng {
    /// Advance and return the new state
    fn next_rand(&mut self) -> u32;
    /// Current state
    fn peek(&self) -> u32;
    /// Replace the state
    fn seed(&mut self, seed: u32);
}

impl Rng for RioRng {
    fn next_rand(&mut self) -> u32 {
        self.0 = 1_566_083_941u32.wrapping_mul(self.0).wrapping_add(1);
        self.0
    }

    fn peek(&self) -> u32 {
        self.0
    }

    fn seed(&mut self, seed: u32) {
        self.0 = seed;
    }
}

/// Byte transform run over the stage 1 region
pub trait Encode {
    /// Transform `data[2..]` starting at key position `key_initial_position`
    fn encode<R: Rng>(
        data: &mut [u8],
        version: u32,
        key: &[u8],
        key_initial_position: usize,
        rng: &mut R,
    );
}

/// Stage 1 decryption direction
#[derive(Debug, Clone, Copy)]
pub struct Decrypter;

impl Encode for Decrypter {
    fn encode<R: Rng>(
        data: &mut [u8],
        version: u32,
        key: &[u8],
        key_initial_position: usize,
        rng: &mut R,
    ) {
        let mut key_offset = 0usize;
        let mut key_position = key_initial_position;

        for x in data.iter_mut().skip(2) {
            if version > 120 {
                *x ^= (f64::from(rng.next_rand()) / 16_777_216.0) as u8;
            }
            *x = x.rotate_right(1);
            *x ^= key[key_offset] ^ key[key_position];
            key_offset += 1;
            key_position = *x as usize % key.len();
            if key_offset >= key.len() {
                key_offset = 0;
            }
        }
    }
}

/// RGB pixels of the scheme's region image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RegionImage {
    /// Wrap `width * height` packed RGB pixels
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> CryptoResult<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(CryptoError::InvalidScheme(format!(
                "region image {width}x{height} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Whether no image was attached
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Pixel at `(x mod width, y mod height)` as `0x00RRGGBB`
    pub(crate) fn pixel(&self, x: u32, y: u32) -> CryptoResult<u32> {
        if self.is_empty() {
            return Err(CryptoError::InvalidScheme(
                "scheme requires a region image".to_string(),
            ));
        }
        let x = (x % self.width) as usize;
        let y = (y % self.height) as usize;
        let at = (y * self.width as usize + x) * 3;
        let rgb = &self.pixels[at..at + 3];
        Ok((u32::from(rgb[0]) << 16) | (u32::from(rgb[1]) << 8) | u32::from(rgb[2]))
    }
}

/// Per-title WARC scheme record
///
/// The JSON form carries the scalar fields and hex-encoded byte strings. The
/// two image assets are attached afterwards with [`WarcScheme::with_shiina_image`]
/// and [`WarcScheme::with_region`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarcScheme {
    /// Archive version as `major * 100 + minor`, e.g. 170 for 1.7
    pub version: u32,
    /// Engine scheme number, e.g. 2500
    pub scheme_version: u32,
    /// Stage 1 substitution key
    #[serde(with = "hex")]
    pub crypt_key: Vec<u8>,
    /// Initial state of the stage 1 region helper
    pub helper_key: [u32; 5],
    /// Optional stage 2 lookup table (at least 0x2000 bytes)
    #[serde(default, with = "hex_option")]
    pub decode_bin: Option<Vec<u8>>,
    /// Optional stage 3 transform
    #[serde(default)]
    pub extra: ExtraCrypt,
    /// Logo image bytes used as a pseudo-random byte source
    #[serde(skip)]
    pub shiina_image: Vec<u8>,
    /// Region image used by the stage 1 helper
    #[serde(skip)]
    pub region: RegionImage,
}

mod hex_option {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => s.serialize_some(&hex::encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|text| hex::decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

impl WarcScheme {
    /// Create a scheme with the mandatory key material
    #[must_use]
    pub fn new(version: u32, scheme_version: u32, crypt_key: Vec<u8>, helper_key: [u32; 5]) -> Self {
        Self {
            version,
            scheme_version,
            crypt_key,
            helper_key,
            decode_bin: None,
            extra: ExtraCrypt::None,
            shiina_image: Vec::new(),
            region: RegionImage::default(),
        }
    }

    /// Parse a scheme record from JSON
    pub fn from_json(text: &str) -> CryptoResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Attach the logo image
    #[must_use]
    pub fn with_shiina_image(mut self, image: Vec<u8>) -> Self {
        self.shiina_image = image;
        self
    }

    /// Attach the region image
    #[must_use]
    pub fn with_region(mut self, region: RegionImage) -> Self {
        self.region = region;
        self
    }

    /// Attach the stage 2 table
    #[must_use]
    pub fn with_decode_bin(mut self, table: Vec<u8>) -> Self {
        self.decode_bin = Some(table);
        self
    }

    /// Select the stage 3 transform
    #[must_use]
    pub fn with_extra(mut self, extra: ExtraCrypt) -> Self {
        self.extra = extra;
        self
    }

    /// Maximum index size in bytes for this version
    #[must_use]
    pub const fn index_size(&self) -> usize {
        let max_index_entries = if self.version < 150 { 8192 } else { 16384 };
        (ENTRY_NAME_SIZE + 0x18) * max_index_entries
    }

    fn validate(&self) -> CryptoResult<()> {
        if self.crypt_key.is_empty() {
            return Err(CryptoError::InvalidScheme("empty crypt key".to_string()));
        }
        if self.version > 120 && self.shiina_image.is_empty() {
            return Err(CryptoError::InvalidScheme(
                "scheme requires a logo image".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stateful WARC decoder for one archive
#[derive(Debug, Clone)]
pub struct WarcDecoder<'a> {
    rng: RioRng,
    scheme: &'a WarcScheme,
}

impl<'a> WarcDecoder<'a> {
    /// Bind a decoder to a scheme
    pub fn new(scheme: &'a WarcScheme) -> CryptoResult<Self> {
        scheme.validate()?;
        Ok(Self {
            rng: RioRng::default(),
            scheme,
        })
    }

    /// The bound scheme
    #[must_use]
    pub const fn scheme(&self) -> &WarcScheme {
        self.scheme
    }

    /// XOR the index with its file offset and, from 1.7, the version number
    pub fn xor_index(&self, index: &mut [u8], offset: u32) {
        let offset = offset.to_le_bytes();
        for chunk in index.chunks_exact_mut(4) {
            for (byte, key) in chunk.iter_mut().zip(offset) {
                *byte ^= key;
            }
        }

        if self.scheme.version >= 170 {
            let version = !(self.scheme.version as u8);
            for byte in index {
                *byte ^= version;
            }
        }
    }

    /// Decrypt the archive index stored at `offset`
    pub fn decrypt_index(&mut self, index: &mut [u8], offset: u32) -> CryptoResult<()> {
        let length = u32::try_from(index.len())
            .map_err(|_| CryptoError::InvalidScheme("index larger than 4 GiB".to_string()))?;
        self.run_encode::<Decrypter>(index, length)?;
        self.xor_index(index, offset);
        Ok(())
    }

    /// Decrypt one entry in place, running every stage the scheme enables
    pub fn decrypt_entry(&mut self, data: &mut [u8], flags: u32) -> CryptoResult<()> {
        let length = u32::try_from(data.len())
            .map_err(|_| CryptoError::InvalidScheme("entry larger than 4 GiB".to_string()))?;
        self.run_encode::<Decrypter>(data, length)?;
        if let Some(table) = &self.scheme.decode_bin {
            crc_crypt(data, table)?;
        }
        self.scheme
            .extra
            .apply(data, flags, self.scheme.scheme_version);
        Ok(())
    }

    /// Stage 1 over `buffer`, parameterized by transform direction
    pub fn run_encode<E: Encode>(&mut self, buffer: &mut [u8], data_length: u32) -> CryptoResult<()> {
        let scheme = self.scheme;
        if scheme.version < 120 || buffer.len() < 3 {
            return Ok(());
        }

        self.rng.seed(data_length);

        let mut index = 0usize;
        let mut effective_length = data_length.min(STAGE1_LIMIT) as usize;
        let mut fac = 0u32;

        let (a, b) = if scheme.version > 120 {
            let a = (buffer[0] ^ data_length as u8) as i8;
            let b = (buffer[1] ^ (data_length >> 1) as u8) as i8;

            if data_length as usize != scheme.index_size()
                && (scheme.version > 130 || scheme.scheme_version > 2150)
            {
                let idx = (f64::from(self.rng.next_rand())
                    * (scheme.shiina_image.len() as f64 / 4_294_967_296.0))
                    as usize;
                let image_byte = |at: usize| u32::from(scheme.shiina_image[at % scheme.shiina_image.len()]);

                if scheme.version >= 160 {
                    fac = self.rng.peek().wrapping_add(image_byte(idx));
                    fac = helper::decrypt_helper3(fac) & 0x0FFF_FFFF;

                    if effective_length > 0x80 && scheme.scheme_version > 2350 {
                        helper::decrypt_helper4(
                            &mut buffer[4..],
                            &scheme.helper_key,
                            &scheme.region,
                        )?;
                        index += 0x80;
                        effective_length -= 0x80;
                    }
                } else if scheme.version == 150 {
                    fac = self.rng.peek().wrapping_add(image_byte(idx));
                    fac ^= (fac & 0xFFF).wrapping_mul(fac & 0xFFF);
                    let mut v = 0u32;
                    for _ in 0..32 {
                        let bit = fac & 1;
                        fac >>= 1;
                        if bit != 0 {
                            v = v.wrapping_add(fac);
                        }
                    }
                    fac = v;
                } else if scheme.version == 140 {
                    fac = image_byte(idx);
                } else if scheme.version == 130 {
                    fac = image_byte(idx & 0xFF);
                }
            }
            (a, b)
        } else {
            (buffer[0] as i8, buffer[1] as i8)
        };

        let seed = self.rng.peek() ^ (helper::decrypt_helper1(f64::from(a)) * 100_000_000.0) as u32;
        self.rng.seed(seed);

        let mut token = 0f64;
        if (a | b) != 0 {
            let a = f64::from(a);
            let b = f64::from(b);
            token = (a / (a * a + b * b).sqrt()).acos();
            token = token / std::f64::consts::PI * 180.0;
        }
        if b < 0 {
            token = 360.0 - token;
        }

        let key = &scheme.crypt_key;
        let x = (fac.wrapping_add(helper::decrypt_helper2(token, &mut self.rng)) & 0xFF) as usize
            % key.len();
        trace!(a, b, fac, x, index, effective_length, "warc stage 1");

        let end = (index + effective_length).min(buffer.len());
        if index < end {
            E::encode(&mut buffer[index..end], scheme.version, key, x, &mut self.rng);
        }
        Ok(())
    }
}

/// Compressed payload tags that carry a duplicated unpacked size
const SIZED_TAGS: [&[u8; 3]; 3] = [b"YH1", b"YLZ", b"YPK"];

/// Cross-check a decrypted entry against its index record
///
/// Compressed payloads repeat the unpacked size after their 4-byte tag; stored
/// payloads must have equal packed and unpacked sizes. Any disagreement means
/// the scheme or key was wrong.
pub fn verify_entry(data: &[u8], packed_size: u32, unpacked_size: u32) -> CryptoResult<()> {
    if data.len() >= 8 && SIZED_TAGS.iter().any(|tag| data[..3] == tag[..]) {
        let stored = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if stored != unpacked_size {
            return Err(CryptoError::DecryptionMismatch(format!(
                "payload declares {stored} bytes, index declares {unpacked_size}"
            )));
        }
        return Ok(());
    }

    if packed_size != unpacked_size {
        debug!(packed_size, unpacked_size, "warc entry without size tag");
        return Err(CryptoError::DecryptionMismatch(format!(
            "untagged payload of {packed_size} bytes, index declares {unpacked_size}"
        )));
    }
    Ok(())
}
