//! Incremental packet assembly.
//!
//! Pulls bytes from a [`Transport`] and rebuilds packets with a small state
//! machine:
//! - `AwaitingHeader`: need 4 bytes for the frame length
//! - `AccumulatingPayload`: header parsed, collecting `remaining` payload bytes
//! - `Broken`: an out-of-range header was seen; nothing is parsed ever again
//!
//! A packet is either handed out whole or not at all. Partial payloads stay
//! inside the assembler.

use std::io;

use bytes::{Bytes, BytesMut};

use super::wire_format::{validate_frame_length, ByteOrder, HEADER_SIZE};
use crate::config::FramerConfig;
use crate::transport::Transport;

/// State machine for packet assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Waiting for a complete 4-byte header.
    AwaitingHeader,
    /// Header parsed, waiting for payload bytes.
    AccumulatingPayload { remaining: usize },
    /// Stream corrupted. Terminal.
    Broken,
}

/// Result of one [`Assembler::poll`] step.
#[derive(Debug, PartialEq, Eq)]
pub enum Poll {
    /// A complete packet payload.
    Packet(Bytes),
    /// The transport has no more bytes for now.
    Pending,
    /// The header carried an out-of-range frame length. The assembler is now broken.
    Invalid { frame_length: u32 },
}

/// Receive-side packet assembler.
#[derive(Debug)]
pub struct Assembler {
    state: State,
    /// Payload bytes received so far for the packet in progress.
    buffer: BytesMut,
    byte_order: ByteOrder,
    max_frame_size: u32,
    initial_capacity: usize,
}

impl Assembler {
    /// Create an assembler using the given configuration.
    pub fn new(config: &FramerConfig) -> Self {
        Self {
            state: State::AwaitingHeader,
            buffer: BytesMut::new(),
            byte_order: config.byte_order,
            max_frame_size: config.max_frame_size,
            initial_capacity: config.initial_capacity,
        }
    }

    /// Consume bytes from `transport` until one packet completes, the
    /// transport runs dry, or the stream turns out to be corrupted.
    ///
    /// Call repeatedly until it returns [`Poll::Pending`]; one readiness event
    /// may carry several packets back to back.
    ///
    /// # Errors
    ///
    /// Only transport I/O errors. Protocol violations are reported as
    /// [`Poll::Invalid`].
    pub fn poll<T: Transport + ?Sized>(&mut self, transport: &mut T) -> io::Result<Poll> {
        loop {
            match self.state {
                State::Broken => return Ok(Poll::Pending),

                State::AwaitingHeader => {
                    if transport.bytes_available() < HEADER_SIZE {
                        return Ok(Poll::Pending);
                    }

                    let header = transport.read(HEADER_SIZE)?;
                    let frame_length = self.byte_order.decode(&header).ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "transport returned a short header",
                        )
                    })?;

                    if validate_frame_length(frame_length, self.max_frame_size).is_err() {
                        self.state = State::Broken;
                        self.buffer = BytesMut::new();
                        return Ok(Poll::Invalid { frame_length });
                    }

                    let remaining = frame_length as usize - HEADER_SIZE;
                    self.buffer.reserve(remaining.min(self.initial_capacity));
                    self.state = State::AccumulatingPayload { remaining };
                }

                State::AccumulatingPayload { remaining } => {
                    let wanted = remaining - self.buffer.len();
                    if wanted > 0 {
                        let chunk = transport.read(wanted)?;

                        // Whole payload in one read: hand out the transport's bytes as-is.
                        if self.buffer.is_empty() && chunk.len() == remaining {
                            self.state = State::AwaitingHeader;
                            return Ok(Poll::Packet(chunk));
                        }
                        self.buffer.extend_from_slice(&chunk);
                    }

                    if self.buffer.len() < remaining {
                        return Ok(Poll::Pending);
                    }

                    self.state = State::AwaitingHeader;
                    return Ok(Poll::Packet(std::mem::take(&mut self.buffer).freeze()));
                }
            }
        }
    }

    /// Drop any partial packet and wait for a fresh header.
    ///
    /// A broken assembler stays broken.
    pub fn reset(&mut self) {
        if self.state == State::Broken {
            return;
        }
        self.buffer.clear();
        self.state = State::AwaitingHeader;
    }

    /// Check if the assembler has seen a corrupted stream.
    #[inline]
    pub fn is_broken(&self) -> bool {
        self.state == State::Broken
    }

    /// Number of payload bytes buffered for the packet in progress.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Current frame length limit.
    #[inline]
    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Change the frame length limit for headers parsed from now on.
    #[inline]
    pub fn set_max_frame_size(&mut self, max: u32) {
        self.max_frame_size = max;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::AwaitingHeader => "AwaitingHeader",
            State::AccumulatingPayload { .. } => "AccumulatingPayload",
            State::Broken => "Broken",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_frame;
    use crate::transport::MemoryTransport;

    fn setup() -> (Assembler, MemoryTransport, MemoryTransport) {
        let (local, peer) = MemoryTransport::pair();
        (Assembler::new(&FramerConfig::default()), local, peer)
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        build_frame(ByteOrder::BigEndian, payload).unwrap()
    }

    /// Poll until pending, collecting packets.
    fn drain(asm: &mut Assembler, t: &mut MemoryTransport) -> Vec<Bytes> {
        let mut packets = Vec::new();
        while let Poll::Packet(p) = asm.poll(t).unwrap() {
            packets.push(p);
        }
        packets
    }

    #[test]
    fn test_single_complete_frame() {
        let (mut asm, mut local, mut peer) = setup();
        peer.write(&frame(b"hello")).unwrap();

        let packets = drain(&mut asm, &mut local);

        assert_eq!(packets, vec![Bytes::from_static(b"hello")]);
        assert_eq!(asm.state_name(), "AwaitingHeader");
        assert_eq!(local.bytes_available(), 0);
    }

    #[test]
    fn test_multiple_frames_in_one_read() {
        let (mut asm, mut local, mut peer) = setup();

        let mut combined = frame(b"first");
        combined.extend(frame(b"second"));
        combined.extend(frame(b"third"));
        peer.write(&combined).unwrap();

        let packets = drain(&mut asm, &mut local);

        assert_eq!(packets.len(), 3);
        assert_eq!(&packets[0][..], b"first");
        assert_eq!(&packets[1][..], b"second");
        assert_eq!(&packets[2][..], b"third");
    }

    #[test]
    fn test_fragmented_header() {
        let (mut asm, mut local, mut peer) = setup();
        let bytes = frame(b"test");

        peer.write(&bytes[..3]).unwrap();
        assert!(drain(&mut asm, &mut local).is_empty());
        assert_eq!(asm.state_name(), "AwaitingHeader");
        assert_eq!(local.bytes_available(), 3);

        peer.write(&bytes[3..]).unwrap();
        let packets = drain(&mut asm, &mut local);
        assert_eq!(packets, vec![Bytes::from_static(b"test")]);
    }

    #[test]
    fn test_fragmented_payload() {
        let (mut asm, mut local, mut peer) = setup();
        let payload = b"this is a longer payload that will be fragmented";
        let bytes = frame(payload);

        let partial = HEADER_SIZE + 10;
        peer.write(&bytes[..partial]).unwrap();
        assert!(drain(&mut asm, &mut local).is_empty());
        assert_eq!(asm.state_name(), "AccumulatingPayload");
        assert_eq!(asm.buffered(), 10);

        peer.write(&bytes[partial..]).unwrap();
        let packets = drain(&mut asm, &mut local);
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][..], payload);
        assert_eq!(asm.buffered(), 0);
    }

    #[test]
    fn test_empty_payload_frame() {
        let (mut asm, mut local, mut peer) = setup();
        peer.write(&frame(b"")).unwrap();

        let packets = drain(&mut asm, &mut local);

        assert_eq!(packets.len(), 1);
        assert!(packets[0].is_empty());
    }

    #[test]
    fn test_empty_frame_between_others() {
        let (mut asm, mut local, mut peer) = setup();
        let mut combined = frame(b"a");
        combined.extend(frame(b""));
        combined.extend(frame(b"b"));
        peer.write(&combined).unwrap();

        let packets = drain(&mut asm, &mut local);
        assert_eq!(packets.len(), 3);
        assert!(packets[1].is_empty());
        assert_eq!(&packets[2][..], b"b");
    }

    #[test]
    fn test_large_payload() {
        let (mut asm, mut local, mut peer) = setup();
        let payload = vec![0xAB; 1024 * 1024];
        peer.write(&frame(&payload)).unwrap();

        let packets = drain(&mut asm, &mut local);

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 1024 * 1024);
        assert!(packets[0].iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_oversized_header_breaks() {
        let (mut local, mut peer) = MemoryTransport::pair();
        let config = FramerConfig {
            max_frame_size: 100,
            ..FramerConfig::default()
        };
        let mut asm = Assembler::new(&config);

        peer.write(&ByteOrder::BigEndian.encode(1000)).unwrap();

        assert_eq!(
            asm.poll(&mut local).unwrap(),
            Poll::Invalid { frame_length: 1000 }
        );
        assert!(asm.is_broken());
    }

    #[test]
    fn test_frame_at_limit_accepted() {
        let (mut local, mut peer) = MemoryTransport::pair();
        let config = FramerConfig {
            max_frame_size: 9,
            ..FramerConfig::default()
        };
        let mut asm = Assembler::new(&config);

        peer.write(&frame(b"hello")).unwrap();
        assert_eq!(
            asm.poll(&mut local).unwrap(),
            Poll::Packet(Bytes::from_static(b"hello"))
        );
    }

    #[test]
    fn test_undersized_header_breaks() {
        let (mut asm, mut local, mut peer) = setup();
        peer.write(&ByteOrder::BigEndian.encode(3)).unwrap();

        assert_eq!(
            asm.poll(&mut local).unwrap(),
            Poll::Invalid { frame_length: 3 }
        );
        assert!(asm.is_broken());
    }

    #[test]
    fn test_broken_ignores_later_valid_frames() {
        let (mut asm, mut local, mut peer) = setup();
        let mut bytes = ByteOrder::BigEndian.encode(0xFFFF_FFFF).to_vec();
        bytes.extend(frame(b"valid"));
        peer.write(&bytes).unwrap();

        assert!(matches!(asm.poll(&mut local).unwrap(), Poll::Invalid { .. }));
        assert_eq!(asm.poll(&mut local).unwrap(), Poll::Pending);
        assert_eq!(local.bytes_available(), bytes.len() - HEADER_SIZE);

        asm.reset();
        assert!(asm.is_broken());
        assert_eq!(asm.poll(&mut local).unwrap(), Poll::Pending);
    }

    #[test]
    fn test_reset_drops_partial_packet() {
        let (mut asm, mut local, mut peer) = setup();
        let bytes = frame(b"abandoned");
        peer.write(&bytes[..HEADER_SIZE + 4]).unwrap();
        drain(&mut asm, &mut local);
        assert_eq!(asm.state_name(), "AccumulatingPayload");

        asm.reset();

        assert_eq!(asm.state_name(), "AwaitingHeader");
        assert_eq!(asm.buffered(), 0);

        peer.write(&frame(b"fresh")).unwrap();
        assert_eq!(drain(&mut asm, &mut local), vec![Bytes::from_static(b"fresh")]);
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let (mut asm, mut local, mut peer) = setup();
        let frame1 = frame(b"first");
        let frame2 = frame(b"second");

        let mut data = frame1.clone();
        data.extend_from_slice(&frame2[..5]);
        peer.write(&data).unwrap();

        let packets = drain(&mut asm, &mut local);
        assert_eq!(packets, vec![Bytes::from_static(b"first")]);
        assert_eq!(asm.state_name(), "AccumulatingPayload");

        peer.write(&frame2[5..]).unwrap();
        let packets = drain(&mut asm, &mut local);
        assert_eq!(packets, vec![Bytes::from_static(b"second")]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let (mut asm, mut local, mut peer) = setup();
        let bytes = frame(b"hi there");

        let mut all = Vec::new();
        for byte in &bytes {
            peer.write(&[*byte]).unwrap();
            all.extend(drain(&mut asm, &mut local));
        }

        assert_eq!(all, vec![Bytes::from_static(b"hi there")]);
    }

    #[test]
    fn test_little_endian_config() {
        let (mut local, mut peer) = MemoryTransport::pair();
        let config = FramerConfig {
            byte_order: ByteOrder::LittleEndian,
            ..FramerConfig::default()
        };
        let mut asm = Assembler::new(&config);

        peer.write(&build_frame(ByteOrder::LittleEndian, b"le").unwrap())
            .unwrap();
        assert_eq!(
            asm.poll(&mut local).unwrap(),
            Poll::Packet(Bytes::from_static(b"le"))
        );
    }
}
