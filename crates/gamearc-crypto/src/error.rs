//! Error types for archive cipher operations

use thiserror::Error;

/// Errors that can occur while decrypting archive entries
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key size
    #[error("Invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected key size in bytes
        expected: usize,
        /// Actual key size in bytes
        actual: usize,
    },

    /// Requested range does not fit inside the buffer
    #[error("Range {offset}+{length} exceeds buffer of {buffer_len} bytes")]
    RangeOutOfBounds {
        /// Start of the range
        offset: usize,
        /// Length of the range
        length: usize,
        /// Length of the buffer
        buffer_len: usize,
    },

    /// Key material handed to [`crate::decrypt`] belongs to another scheme
    #[error("Key material for {actual} cannot drive scheme {expected}")]
    KeyMismatch {
        /// Scheme that was requested
        expected: &'static str,
        /// Scheme the key material belongs to
        actual: &'static str,
    },

    /// Scheme record is incomplete or inconsistent
    #[error("Invalid scheme: {0}")]
    InvalidScheme(String),

    /// Decrypted data failed a consistency check
    #[error("Decryption check failed: {0}")]
    DecryptionMismatch(String),

    /// Segment data is malformed
    #[error("Invalid segment: {0}")]
    InvalidSegment(String),

    /// I/O error while reading archive data
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Scheme record could not be parsed
    #[error("Scheme record error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for cipher operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Resolve `offset..offset + length` against a buffer, rejecting overflow.
pub(crate) fn checked_range(
    buffer_len: usize,
    offset: usize,
    length: usize,
) -> CryptoResult<std::ops::Range<usize>> {
    match offset.checked_add(length) {
        Some(end) if end <= buffer_len => Ok(offset..end),
        _ => Err(CryptoError::RangeOutOfBounds {
            offset,
            length,
            buffer_len,
        }),
    }
}
