//! Protocol module - wire format, frame construction, and packet assembly.
//!
//! This module implements the length-prefixed framing:
//! - 4-byte length header encoding/decoding
//! - Frame building for the send path
//! - Assembler for rebuilding packets from partial reads

mod assembler;
mod frame;
mod wire_format;

pub use assembler::{Assembler, Poll};
pub use frame::{build_frame, build_frame_parts};
pub use wire_format::{
    frame_length_for, validate_frame_length, ByteOrder, DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE,
    MAX_PAYLOAD_SIZE,
};
