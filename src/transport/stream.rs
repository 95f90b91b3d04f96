//! Transport adapter over connected std sockets.
//!
//! - `TcpStream` on every platform
//! - `UnixStream` on unix
//!
//! The socket stays in blocking mode except while draining: pending bytes are
//! pulled into an internal buffer with a non-blocking read loop, and
//! [`wait_for_readable`](Transport::wait_for_readable) uses a blocking read with
//! a read timeout.
//!
//! Writes never block. They go straight to the socket with one non-blocking
//! vectored write; whatever the socket refuses is kept in an outbound buffer
//! and pushed out from later `next_event` and `wait_for_readable` calls. Each
//! push reports the bytes that actually left as `BytesFlushed`.
//!
//! # Example
//!
//! ```ignore
//! use std::net::TcpStream;
//! use packetwire::{PacketFramer, transport::StreamTransport};
//!
//! let stream = TcpStream::connect("127.0.0.1:7000")?;
//! let mut framer = PacketFramer::new(StreamTransport::new(stream)?);
//! framer.send(b"hello")?;
//! ```

use std::collections::VecDeque;
use std::io::{self, IoSlice, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};

use super::{Transport, TransportEvent};

/// Size of the scratch buffer used for socket reads (64KB).
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Read timeout slice used while outbound bytes are still queued.
const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Socket operations the adapter needs beyond `Read + Write`.
pub trait Socket: Read + Write {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn shutdown(&self) -> io::Result<()>;
}

impl Socket for TcpStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        TcpStream::set_nonblocking(self, nonblocking)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

#[cfg(unix)]
impl Socket for std::os::unix::net::UnixStream {
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        std::os::unix::net::UnixStream::set_nonblocking(self, nonblocking)
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        std::os::unix::net::UnixStream::shutdown(self, Shutdown::Both)
    }
}

/// A [`Transport`] over a connected socket.
pub struct StreamTransport<S> {
    socket: S,
    /// Bytes pulled off the socket and not yet read.
    inbound: BytesMut,
    /// Bytes accepted by `write` that the socket has not taken yet.
    outbound: BytesMut,
    events: VecDeque<TransportEvent>,
    scratch: Vec<u8>,
    closed: bool,
}

impl<S: Socket> StreamTransport<S> {
    /// Wrap a connected socket. Puts it into blocking mode.
    pub fn new(socket: S) -> io::Result<Self> {
        socket.set_nonblocking(false)?;
        Ok(Self {
            socket,
            inbound: BytesMut::new(),
            outbound: BytesMut::new(),
            events: VecDeque::new(),
            scratch: vec![0u8; READ_CHUNK_SIZE],
            closed: false,
        })
    }

    /// Shut the socket down and raise `AboutToClose`. Closing twice is a no-op.
    ///
    /// Outbound bytes the socket still refuses are discarded.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush_outbound() {
            tracing::debug!("Final flush failed: {}", e);
        }
        if !self.outbound.is_empty() {
            tracing::debug!("Discarding {} unsent bytes on close", self.outbound.len());
            self.outbound.clear();
        }
        if let Err(e) = self.socket.shutdown() {
            if e.kind() != io::ErrorKind::NotConnected {
                tracing::debug!("Socket shutdown failed: {}", e);
            }
        }
        self.closed = true;
        self.events.push_back(TransportEvent::AboutToClose);
    }

    /// Check whether the stream ended or was closed locally.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes accepted by `write` and still waiting for the socket.
    pub fn pending_outbound(&self) -> usize {
        self.outbound.len()
    }

    /// Get a reference to the underlying socket.
    pub fn get_ref(&self) -> &S {
        &self.socket
    }

    /// Unwrap the socket, discarding buffered bytes and pending events.
    pub fn into_inner(self) -> S {
        self.socket
    }

    /// Pull every byte the socket can hand over without blocking.
    ///
    /// Returns the byte count and whether end of stream was seen.
    fn pull(&mut self) -> io::Result<(usize, bool)> {
        self.nonblocking(Self::pull_nonblocking)
    }

    fn pull_nonblocking(&mut self) -> io::Result<(usize, bool)> {
        let mut total = 0;
        loop {
            match self.socket.read(&mut self.scratch) {
                Ok(0) => return Ok((total, true)),
                Ok(n) => {
                    self.inbound.extend_from_slice(&self.scratch[..n]);
                    total += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok((total, false)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `op` with the socket switched to non-blocking mode.
    fn nonblocking<R>(&mut self, op: impl FnOnce(&mut Self) -> io::Result<R>) -> io::Result<R> {
        self.socket.set_nonblocking(true)?;
        let result = op(self);
        self.socket.set_nonblocking(false)?;
        result
    }

    /// Push as much of the outbound buffer as the socket takes without blocking.
    fn flush_outbound(&mut self) -> io::Result<()> {
        if self.outbound.is_empty() {
            return Ok(());
        }
        let sent = self.nonblocking(|t| {
            let mut sent = 0;
            while !t.outbound.is_empty() {
                match t.socket.write(&t.outbound) {
                    Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                    Ok(n) => {
                        t.outbound.advance(n);
                        sent += n;
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            Ok(sent)
        })?;

        if sent > 0 {
            tracing::trace!("Flushed {} queued bytes, {} left", sent, self.outbound.len());
            self.events.push_back(TransportEvent::BytesFlushed(sent));
        }
        Ok(())
    }

    /// One blocking read bounded by `timeout`. `None` means it timed out.
    fn read_with_timeout(&mut self, timeout: Option<Duration>) -> io::Result<Option<usize>> {
        self.socket.set_read_timeout(timeout)?;
        let result = loop {
            match self.socket.read(&mut self.scratch) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other,
            }
        };
        self.socket.set_read_timeout(None)?;

        match result {
            Ok(n) => {
                self.inbound.extend_from_slice(&self.scratch[..n]);
                Ok(Some(n))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Queue events for a pull: data first, then end of stream.
    fn signal(&mut self, received: usize, eof: bool) {
        if received > 0 {
            self.events.push_back(TransportEvent::Readable);
        }
        if eof && !self.closed {
            self.closed = true;
            self.events.push_back(TransportEvent::AboutToClose);
        }
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stream transport closed",
            ));
        }
        Ok(())
    }
}

impl<S: Socket> Transport for StreamTransport<S> {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_vectored(&[IoSlice::new(data)])
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        self.ensure_open()?;

        // Earlier bytes must leave first, so only write directly when nothing is queued.
        let mut written = 0;
        if self.outbound.is_empty() {
            written = self.nonblocking(|t| loop {
                match t.socket.write_vectored(bufs) {
                    Ok(n) => return Ok(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(0),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            })?;
        }

        let mut skip = written;
        for buf in bufs {
            if skip >= buf.len() {
                skip -= buf.len();
                continue;
            }
            self.outbound.extend_from_slice(&buf[skip..]);
            skip = 0;
        }

        if written > 0 {
            self.events.push_back(TransportEvent::BytesFlushed(written));
        }
        self.flush_outbound()
    }

    fn read(&mut self, max: usize) -> io::Result<Bytes> {
        let n = max.min(self.inbound.len());
        Ok(self.inbound.split_to(n).freeze())
    }

    fn bytes_available(&self) -> usize {
        self.inbound.len()
    }

    fn wait_for_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        if self.events.contains(&TransportEvent::Readable) {
            return Ok(true);
        }
        if self.closed {
            return Ok(false);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            self.flush_outbound()?;

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                let (received, eof) = self.pull()?;
                self.signal(received, eof);
                return Ok(received > 0);
            }

            // Keep queued writes moving while blocked on the read side.
            let draining = !self.outbound.is_empty();
            let slice = if draining {
                Some(remaining.map_or(FLUSH_POLL_INTERVAL, |r| r.min(FLUSH_POLL_INTERVAL)))
            } else {
                remaining
            };

            match self.read_with_timeout(slice)? {
                Some(0) => {
                    self.signal(0, true);
                    return Ok(false);
                }
                Some(n) => {
                    let (more, eof) = self.pull()?;
                    self.signal(n + more, eof);
                    return Ok(true);
                }
                None if draining => continue,
                None => return Ok(false),
            }
        }
    }

    fn next_event(&mut self) -> io::Result<Option<TransportEvent>> {
        if self.events.is_empty() && !self.closed {
            self.flush_outbound()?;
            let (received, eof) = self.pull()?;
            self.signal(received, eof);
        }
        Ok(self.events.pop_front())
    }
}
