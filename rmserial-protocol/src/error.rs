//! Frame decoding and encoding errors.

use thiserror::Error;

/// Errors produced while encoding, decoding or framing referee frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("invalid start marker: expected 0xa5, got {0:#04x}")]
    InvalidMarker(u8),

    #[error("header checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    HeaderChecksumMismatch { expected: u8, actual: u8 },

    #[error("frame checksum mismatch: expected {expected:#06x}, got {actual:#06x}")]
    FrameChecksumMismatch { expected: u16, actual: u16 },

    #[error("declared payload length {length} exceeds maximum {max}")]
    LengthOutOfRange { length: u16, max: u16 },

    #[error("incomplete frame: need {needed} more bytes")]
    IncompleteFrame { needed: usize },

    #[error("frame span is {actual} bytes, header declares {expected}")]
    FrameLengthMismatch { expected: usize, actual: usize },

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

impl FrameError {
    /// Returns whether this error means the stream carried corrupted bytes.
    ///
    /// The framer drops the offending marker byte and resynchronizes after
    /// these; everything else is a caller error or a request for more input.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            FrameError::InvalidMarker(_)
                | FrameError::HeaderChecksumMismatch { .. }
                | FrameError::FrameChecksumMismatch { .. }
                | FrameError::LengthOutOfRange { .. }
                | FrameError::FrameLengthMismatch { .. }
        )
    }
}
