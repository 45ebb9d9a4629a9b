//! Error types for decoders

use thiserror::Error;

/// Broad failure category of a [`DecodeError`]
///
/// Callers recover at entry granularity and usually only need the category:
/// a truncated or corrupt entry can be retried as raw data, an unsupported one
/// can be reported as such. Post-decryption integrity failures are reported by
/// the cipher crate, which owns those checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Structural inconsistency in headers or streams
    Format,
    /// Source ran out before the output was complete
    TruncatedInput,
    /// Recognized sub-mode that is not implemented
    UnsupportedVariant,
}

/// Errors that can occur while decoding an entry
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Signature bytes do not match
    #[error("invalid signature: expected {expected:02X?}, got {actual:02X?}")]
    InvalidSignature {
        /// Expected bytes
        expected: Vec<u8>,
        /// Bytes found in the input
        actual: Vec<u8>,
    },

    /// A count or size field disagrees with the data
    #[error("count mismatch in {context}: expected {expected}, got {actual}")]
    CountMismatch {
        /// What was being counted
        context: &'static str,
        /// Expected value
        expected: usize,
        /// Actual value
        actual: usize,
    },

    /// A header requests more than the configured limits allow
    #[error("{context} of {requested} exceeds limit of {limit}")]
    LimitExceeded {
        /// What was being sized
        context: &'static str,
        /// Requested amount
        requested: u64,
        /// Configured limit
        limit: u64,
    },

    /// Other structural error
    #[error("format error: {0}")]
    Format(String),

    /// Source exhausted
    #[error("truncated input: needed {needed} more, {available} available")]
    TruncatedInput {
        /// Units (bits or bytes, per decoder) still required
        needed: usize,
        /// Units that were left
        available: usize,
    },

    /// Recognized but unimplemented sub-mode
    #[error("unsupported variant: {0}")]
    UnsupportedVariant(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary parsing error
    #[error("binary parsing error: {0}")]
    BinRw(#[from] binrw::Error),
}

impl DecodeError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSignature { .. }
            | Self::CountMismatch { .. }
            | Self::LimitExceeded { .. }
            | Self::Format(_) => ErrorKind::Format,
            Self::TruncatedInput { .. } => ErrorKind::TruncatedInput,
            Self::UnsupportedVariant(_) => ErrorKind::UnsupportedVariant,
            Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                ErrorKind::TruncatedInput
            }
            Self::Io(_) => ErrorKind::Format,
            Self::BinRw(e) if e.is_eof() => ErrorKind::TruncatedInput,
            Self::BinRw(_) => ErrorKind::Format,
        }
    }

    pub(crate) fn truncated(needed: usize, available: usize) -> Self {
        Self::TruncatedInput { needed, available }
    }

    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        Self::UnsupportedVariant(what.into())
    }
}

/// Result type for decode operations
pub type DecodeResult<T> = Result<T, DecodeError>;
