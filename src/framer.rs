//! Packet framer and its builder.
//!
//! [`PacketFramer`] turns a boundary-less [`Transport`] into a sequence of
//! discrete packets. It is driven entirely by [`TransportEvent`]s plus direct
//! calls from its owner:
//! 1. `send()` frames a payload and writes it, recording it in the send ledger
//! 2. `Readable` events feed the assembler, which queues complete packets
//! 3. `BytesFlushed` events drain the ledger
//! 4. `AboutToClose` drops partial state
//!
//! # Example
//!
//! ```
//! use packetwire::{FramerBuilder, FramerEvent, PacketFramer};
//! use packetwire::transport::MemoryTransport;
//!
//! let (a, b) = MemoryTransport::pair();
//! let mut client = PacketFramer::new(a);
//! let mut server = FramerBuilder::new().max_frame_size(1024 * 1024).build(b);
//!
//! client.send(b"hello").unwrap();
//! server.process_events().unwrap();
//!
//! assert_eq!(server.poll_event(), Some(FramerEvent::PacketReady));
//! assert_eq!(server.packets_available(), 1);
//! assert_eq!(&server.read().unwrap()[..], b"hello");
//! ```

use std::collections::VecDeque;
use std::io::IoSlice;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::FramerConfig;
use crate::error::{FramerError, Result};
use crate::ledger::SendLedger;
use crate::protocol::{build_frame_parts, Assembler, ByteOrder, Poll, HEADER_SIZE};
use crate::transport::{Transport, TransportEvent};

/// Notification raised by the framer for its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerEvent {
    /// A packet was appended to the ready queue.
    PacketReady,
    /// Every byte of one sent packet left the transport.
    PacketWritten,
    /// The peer sent an out-of-range frame length. Raised once; the framer is dead.
    InvalidPacket { frame_length: u32, max: u32 },
}

/// Builder for configuring and creating a [`PacketFramer`].
#[derive(Debug, Clone, Default)]
pub struct FramerBuilder {
    config: FramerConfig,
}

impl FramerBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the largest accepted frame length (header included).
    ///
    /// Default: `0x7FFF_FFFF`
    pub fn max_frame_size(mut self, max: u32) -> Self {
        self.config.max_frame_size = max;
        self
    }

    /// Set the byte order of the length header.
    ///
    /// Default: big endian
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.config.byte_order = order;
        self
    }

    /// Cap the up-front reservation made when a header announces a payload.
    ///
    /// Default: 64KB
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_capacity = capacity;
        self
    }

    /// Build a framer bound to `transport`.
    pub fn build<T: Transport>(self, transport: T) -> PacketFramer<T> {
        PacketFramer::with_config(transport, self.config)
    }
}

/// Length-prefixed packet framer over a duplex transport.
///
/// Single-threaded: every state change happens inside a method call on the
/// framer. The only call that blocks is [`wait_for_ready_read`](Self::wait_for_ready_read).
///
/// The framer never closes its transport. An owned transport is dropped with
/// the framer and follows its own `Drop`; to keep it alive, build the framer
/// over `&mut transport` or take it back with [`into_transport`](Self::into_transport).
pub struct PacketFramer<T> {
    transport: T,
    config: FramerConfig,
    assembler: Assembler,
    /// Bytes handed to the transport and not yet flushed, per sent packet.
    ledger: SendLedger,
    /// Complete packets waiting for `read()`.
    ready: VecDeque<Bytes>,
    /// Notifications waiting for `poll_event()`.
    events: VecDeque<FramerEvent>,
    /// Set while a caller is inside `wait_for_ready_read`; cleared when a packet completes.
    waiting_for_packet: bool,
}

impl<T: Transport> PacketFramer<T> {
    /// Create a framer with default configuration.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, FramerConfig::default())
    }

    /// Create a framer with the given configuration.
    pub fn with_config(transport: T, config: FramerConfig) -> Self {
        Self {
            transport,
            assembler: Assembler::new(&config),
            config,
            ledger: SendLedger::new(),
            ready: VecDeque::new(),
            events: VecDeque::new(),
            waiting_for_packet: false,
        }
    }

    /// Frame `payload` and write it to the transport.
    ///
    /// An empty payload is silently dropped: nothing is written and nothing
    /// is recorded. Peers still accept empty frames on the receive side.
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` if the frame length does not fit in 32 bits
    /// - `Broken` after the framer saw an invalid packet
    /// - `Io` if the transport rejects the write
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Ok(());
        }
        if self.is_broken() {
            tracing::debug!("Dropping send of {} bytes on broken framer", payload.len());
            return Err(FramerError::Broken);
        }

        let (header, payload) = build_frame_parts(self.config.byte_order, payload)?;
        let frame_len = HEADER_SIZE + payload.len();

        self.ledger.push(frame_len);
        let bufs = [IoSlice::new(&header), IoSlice::new(payload)];
        if let Err(e) = self.transport.write_vectored(&bufs) {
            self.ledger.retract_last();
            return Err(FramerError::Io(e));
        }

        tracing::trace!("Sent frame of {} bytes", frame_len);
        Ok(())
    }

    /// Number of complete packets waiting to be read.
    #[inline]
    pub fn packets_available(&self) -> usize {
        self.ready.len()
    }

    /// Take the oldest complete packet, if any. Never blocks.
    pub fn read(&mut self) -> Option<Bytes> {
        self.ready.pop_front()
    }

    /// Discard every complete packet not yet read.
    pub fn clear(&mut self) {
        self.ready.clear();
    }

    /// Block until a complete packet is ready or `timeout` elapses.
    ///
    /// Returns `true` immediately if a packet is already queued. Otherwise
    /// waits on the transport, dispatching its events in between, until a
    /// packet completes. One wake-up may deliver only part of a packet, so the
    /// wait is repeated with the time that is left. `None` waits without a
    /// deadline.
    ///
    /// Must not be called from inside an event handler of the same framer.
    ///
    /// # Errors
    ///
    /// Transport I/O errors. A timeout is `Ok(false)`, not an error.
    pub fn wait_for_ready_read(&mut self, timeout: Option<Duration>) -> Result<bool> {
        if !self.ready.is_empty() {
            return Ok(true);
        }
        if self.is_broken() {
            return Ok(false);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        self.waiting_for_packet = true;
        let result = self.wait_loop(deadline);
        self.waiting_for_packet = false;
        result
    }

    fn wait_loop(&mut self, deadline: Option<Instant>) -> Result<bool> {
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if !self.transport.wait_for_readable(remaining)? {
                return Ok(false);
            }

            self.process_events()?;
            if !self.waiting_for_packet {
                return Ok(true);
            }
            if self.is_broken() {
                return Ok(false);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(false);
            }
        }
    }

    /// Drain the transport's pending events and dispatch each one.
    ///
    /// Returns the number of events dispatched. Stops early once the framer
    /// breaks, leaving the transport's remaining events untouched.
    pub fn process_events(&mut self) -> Result<usize> {
        let mut dispatched = 0;
        while !self.is_broken() {
            let Some(event) = self.transport.next_event()? else {
                break;
            };
            self.handle_event(event)?;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Dispatch a single transport event.
    ///
    /// For owners that run their own event loop instead of `process_events`.
    /// Events are ignored once the framer is broken.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        if self.is_broken() {
            return Ok(());
        }

        match event {
            TransportEvent::Readable => self.on_readable()?,
            TransportEvent::AboutToClose => self.on_about_to_close(),
            TransportEvent::BytesFlushed(n) => self.on_bytes_flushed(n),
        }
        Ok(())
    }

    /// Take the oldest pending notification, if any.
    ///
    /// Notifications accumulate until polled.
    pub fn poll_event(&mut self) -> Option<FramerEvent> {
        self.events.pop_front()
    }

    /// Check if the framer saw an invalid packet and stopped talking to its transport.
    #[inline]
    pub fn is_broken(&self) -> bool {
        self.assembler.is_broken()
    }

    /// Bytes written to the transport and not yet flushed.
    #[inline]
    pub fn pending_write_bytes(&self) -> usize {
        self.ledger.pending_bytes()
    }

    /// Sent packets with bytes not yet flushed.
    #[inline]
    pub fn pending_write_packets(&self) -> usize {
        self.ledger.pending_frames()
    }

    /// Current frame length limit.
    #[inline]
    pub fn max_frame_size(&self) -> u32 {
        self.config.max_frame_size
    }

    /// Change the frame length limit.
    ///
    /// Values too small to hold a header are ignored. Returns the limit now in
    /// effect.
    pub fn set_max_frame_size(&mut self, max: u32) -> u32 {
        if max as usize > HEADER_SIZE {
            self.config.max_frame_size = max;
            self.assembler.set_max_frame_size(max);
        }
        self.config.max_frame_size
    }

    /// Byte order of the length header.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.config.byte_order
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the transport.
    ///
    /// Bytes read directly from it are lost to the framer.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Unwrap the transport. The transport is not closed.
    pub fn into_transport(self) -> T {
        self.transport
    }

    fn on_readable(&mut self) -> Result<()> {
        loop {
            match self.assembler.poll(&mut self.transport)? {
                Poll::Packet(packet) => {
                    tracing::trace!("Packet of {} bytes ready", packet.len());
                    self.ready.push_back(packet);
                    self.waiting_for_packet = false;
                    self.events.push_back(FramerEvent::PacketReady);
                }
                Poll::Pending => return Ok(()),
                Poll::Invalid { frame_length } => {
                    let max = self.config.max_frame_size;
                    tracing::warn!(
                        "Invalid frame length {} (max {}), dropping transport",
                        frame_length,
                        max
                    );
                    self.ledger.clear();
                    self.events
                        .push_back(FramerEvent::InvalidPacket { frame_length, max });
                    return Ok(());
                }
            }
        }
    }

    fn on_about_to_close(&mut self) {
        tracing::debug!(
            "Transport closing, dropping {} partial bytes and {} unflushed",
            self.assembler.buffered(),
            self.ledger.pending_bytes()
        );
        self.assembler.reset();
        self.ledger.clear();
    }

    fn on_bytes_flushed(&mut self, n: usize) {
        let completed = self.ledger.release(n);
        for _ in 0..completed {
            self.events.push_back(FramerEvent::PacketWritten);
        }
    }
}
