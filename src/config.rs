//! Framer configuration.

use crate::protocol::{ByteOrder, DEFAULT_MAX_FRAME_SIZE};

/// Default cap on the up-front reservation for an incoming packet (64KB).
pub const DEFAULT_INITIAL_CAPACITY: usize = 64 * 1024;

/// Configuration for a [`PacketFramer`](crate::PacketFramer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramerConfig {
    /// Largest accepted `frame_length`, header included.
    pub max_frame_size: u32,
    /// Byte order of the length header. Both ends must agree.
    pub byte_order: ByteOrder,
    /// Upper bound on the buffer reserved when a header announces a payload.
    ///
    /// Larger payloads grow the buffer as bytes actually arrive.
    pub initial_capacity: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            byte_order: ByteOrder::BigEndian,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
        }
    }
}
