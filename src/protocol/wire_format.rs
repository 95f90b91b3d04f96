//! Wire format encoding and decoding.
//!
//! Every frame starts with a 4-byte length header:
//! ```text
//! ┌──────────────┬──────────────────────────┐
//! │ frame_length │ payload                  │
//! │ 4 bytes      │ frame_length - 4 bytes   │
//! │ uint32       │                          │
//! └──────────────┴──────────────────────────┘
//! ```
//!
//! `frame_length` counts itself, so the smallest legal value is 4 (an empty
//! payload). The byte order is fixed per deployment; both ends must agree.

use crate::error::{FramerError, Result};

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Default maximum frame length (max i32).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 0x7FFF_FFFF;

/// Largest payload a 32-bit frame length can describe.
pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize - HEADER_SIZE;

/// Byte order of the length header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Network byte order.
    #[default]
    BigEndian,
    LittleEndian,
}

impl ByteOrder {
    /// Encode a frame length in this byte order.
    #[inline]
    pub fn encode(self, frame_length: u32) -> [u8; HEADER_SIZE] {
        match self {
            ByteOrder::BigEndian => frame_length.to_be_bytes(),
            ByteOrder::LittleEndian => frame_length.to_le_bytes(),
        }
    }

    /// Decode a frame length in this byte order.
    ///
    /// Returns `None` if buffer is too short.
    #[inline]
    pub fn decode(self, buf: &[u8]) -> Option<u32> {
        let raw: [u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(match self {
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
        })
    }
}

/// Compute the frame length for a payload.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the frame length would not fit in 32 bits.
pub fn frame_length_for(payload_len: usize) -> Result<u32> {
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(FramerError::PayloadTooLarge {
            len: payload_len,
            max: MAX_PAYLOAD_SIZE,
        });
    }
    Ok((payload_len + HEADER_SIZE) as u32)
}

/// Validate a decoded frame length against the accepted range `4..=max`.
pub fn validate_frame_length(frame_length: u32, max_frame_size: u32) -> Result<()> {
    if (frame_length as usize) < HEADER_SIZE || frame_length > max_frame_size {
        return Err(FramerError::InvalidFrameLength {
            frame_length,
            max: max_frame_size,
        });
    }
    Ok(())
}
