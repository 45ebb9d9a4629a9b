//! Entropy decoders, LZSS variants and block-transform codecs for
//! visual-novel game archives.
//!
//! This crate provides:
//! - An MSB-first bit reader with gamma codes
//! - A range coder with an adaptive frequency model
//! - An adaptive Huffman tree that grows leaves on first use
//! - ONScripter, PT1, WBM, TLG5 slide and generic ring-window LZSS
//! - TLG5 and TLG6 images, optionally inside a TLG0 container
//! - Entis ERI images and MIO sound
//!
//! Every decoder is buffer in, buffer out. Output sizes taken from headers
//! are checked against [`DecodeLimits`] before anything is allocated, and a
//! truncated source is reported as [`ErrorKind::TruncatedInput`] rather than
//! read past.
//!
//! # Examples
//!
//! ```
//! use gamearc_formats::{LzssVariant, decompress_lzss};
//!
//! // One literal, then five bytes copied from one byte back
//! let packed = [0x02, b'z', 0x00, 0x02];
//! let out = decompress_lzss(LzssVariant::Wbm, &packed, 6).expect("valid stream");
//! assert_eq!(out, b"zzzzzz");
//! ```

#![warn(missing_docs)]

pub mod bits;
pub mod config;
pub mod entis;
pub mod error;
pub mod huffman;
mod input;
pub mod lzss;
pub mod pixel;
pub mod range_coder;
pub mod tlg;

pub use bits::{BitReader, BitSource};
pub use config::DecodeLimits;
pub use entis::{
    Architecture, BlockTransformParams, Transformation, decode_block_transform,
    decode_block_transform_with_limits, decode_eri, decode_eri_with_limits, decode_mio,
    decode_mio_with_limits,
};
pub use error::{DecodeError, DecodeResult, ErrorKind};
pub use huffman::{EscapeCoding, HuffmanTree};
pub use lzss::{LzssVariant, OkumuraParams, SlideDecoder, decompress_lzss, decompress_lzss_with_limits};
pub use pixel::{PixelBuffer, PixelFormat, SampleBuffer};
pub use range_coder::{AdaptiveModel, RangeDecoder, decode_range_coded, decode_range_coded_with_limits};
pub use tlg::{TlgVersion, decode_tlg, decode_tlg_with_limits};
