//! Error types for packetwire.

use thiserror::Error;

/// Main error type for all framer operations.
#[derive(Debug, Error)]
pub enum FramerError {
    /// I/O error reported by the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Payload is too large to be described by a 32-bit frame length.
    #[error("Payload of {len} bytes exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Frame length header outside the accepted range.
    #[error("Frame length {frame_length} outside accepted range (max {max})")]
    InvalidFrameLength { frame_length: u32, max: u32 },

    /// The framer saw a protocol violation and no longer talks to its transport.
    #[error("Framer is broken after an invalid packet")]
    Broken,
}

/// Result type alias using FramerError.
pub type Result<T> = std::result::Result<T, FramerError>;
