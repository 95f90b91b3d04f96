//! Frame construction.
//!
//! A frame is the length header followed by the raw payload. The framer
//! writes frames with scatter/gather I/O via [`build_frame_parts`];
//! [`build_frame`] produces one contiguous buffer, which is handy for tests
//! and for transports without vectored writes.
//!
//! # Example
//!
//! ```
//! use packetwire::protocol::{build_frame, ByteOrder, HEADER_SIZE};
//!
//! let bytes = build_frame(ByteOrder::BigEndian, b"hello").unwrap();
//! assert_eq!(bytes.len(), HEADER_SIZE + 5);
//! assert_eq!(&bytes[..HEADER_SIZE], &[0, 0, 0, 9]);
//! ```

use super::wire_format::{frame_length_for, ByteOrder, HEADER_SIZE};
use crate::error::Result;

/// Build a complete frame as a single byte vector.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the payload cannot be described by a 32-bit
/// frame length.
pub fn build_frame(order: ByteOrder, payload: &[u8]) -> Result<Vec<u8>> {
    let (header, payload) = build_frame_parts(order, payload)?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Build frame parts for scatter/gather I/O.
///
/// Returns the encoded header and a reference to the payload, avoiding a copy
/// of the payload for writev-style transports.
///
/// # Example
///
/// ```
/// use packetwire::protocol::{build_frame_parts, ByteOrder};
///
/// let (header, payload) = build_frame_parts(ByteOrder::LittleEndian, b"hi").unwrap();
/// assert_eq!(header, [6, 0, 0, 0]);
/// assert_eq!(payload, b"hi");
/// ```
pub fn build_frame_parts(order: ByteOrder, payload: &[u8]) -> Result<([u8; HEADER_SIZE], &[u8])> {
    let frame_length = frame_length_for(payload.len())?;
    Ok((order.encode(frame_length), payload))
}
