//! Decode limits
//!
//! Every decoder sizes its output from header fields. [`DecodeLimits`] bounds
//! those sizes before anything is allocated, so a corrupt or hostile header
//! fails with a format error instead of exhausting memory.

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, DecodeResult};

/// Upper bounds applied before allocating output buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeLimits {
    /// Maximum size of any single output buffer in bytes
    pub max_output_bytes: u64,
    /// Maximum image width or height in pixels
    pub max_dimension: u32,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_output_bytes: 256 * 1024 * 1024, // 256 MiB
            max_dimension: 32_768,
        }
    }
}

impl DecodeLimits {
    /// Create limits with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum output size
    pub fn with_max_output_bytes(mut self, max_output_bytes: u64) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    /// Set the maximum image dimension
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    /// Reject an output buffer larger than the limit
    pub fn check_output(&self, bytes: u64) -> DecodeResult<usize> {
        if bytes > self.max_output_bytes {
            return Err(DecodeError::LimitExceeded {
                context: "output size",
                requested: bytes,
                limit: self.max_output_bytes,
            });
        }
        usize::try_from(bytes).map_err(|_| DecodeError::LimitExceeded {
            context: "output size",
            requested: bytes,
            limit: usize::MAX as u64,
        })
    }

    /// Reject zero or oversized image dimensions
    pub fn check_dimensions(&self, width: u32, height: u32) -> DecodeResult<()> {
        if width == 0 || height == 0 {
            return Err(DecodeError::Format(format!(
                "empty image dimensions {width}x{height}"
            )));
        }
        let largest = width.max(height);
        if largest > self.max_dimension {
            return Err(DecodeError::LimitExceeded {
                context: "image dimension",
                requested: u64::from(largest),
                limit: u64::from(self.max_dimension),
            });
        }
        Ok(())
    }

    /// Check `width * height * bytes_per_pixel` and return it as a buffer length
    pub fn check_image(&self, width: u32, height: u32, bytes_per_pixel: u32) -> DecodeResult<usize> {
        self.check_dimensions(width, height)?;
        self.check_output(u64::from(width) * u64::from(height) * u64::from(bytes_per_pixel))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_defaults() {
        let limits = DecodeLimits::default();
        assert_eq!(limits.max_output_bytes, 256 * 1024 * 1024);
        assert_eq!(
            limits.check_output(1024).expect("Test operation should succeed"),
            1024
        );
        assert!(limits.check_output(limits.max_output_bytes + 1).is_err());
    }

    #[test]
    fn test_dimension_checks() {
        let limits = DecodeLimits::new().with_max_dimension(64);
        assert!(limits.check_dimensions(64, 1).is_ok());
        let err = limits.check_dimensions(65, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(limits.check_dimensions(0, 10).is_err());

        let limits = limits.with_max_output_bytes(100);
        assert_eq!(
            limits.check_image(5, 5, 4).expect("Test operation should succeed"),
            100
        );
        assert!(limits.check_image(5, 6, 4).is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let limits: DecodeLimits =
            serde_json::from_str(r#"{"max_dimension": 4096}"#).expect("Test operation should succeed");
        assert_eq!(limits.max_dimension, 4096);
        assert_eq!(limits.max_output_bytes, DecodeLimits::default().max_output_bytes);

        let text = serde_json::to_string(&limits).expect("Test operation should succeed");
        let back: DecodeLimits = serde_json::from_str(&text).expect("Test operation should succeed");
        assert_eq!(back, limits);
    }
}
