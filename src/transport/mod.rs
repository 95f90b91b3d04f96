//! Transport module - the duplex byte stream underneath the framer.
//!
//! A [`Transport`] moves raw, boundary-less bytes in both directions and
//! reports readiness through [`TransportEvent`]s. Two implementations ship
//! with the crate:
//! - [`MemoryTransport`]: connected in-memory endpoints, usable across threads
//! - [`StreamTransport`]: adapter over a connected `TcpStream` / `UnixStream`
//!
//! `&mut T` and `Box<T>` forward to `T`. A framer built over `&mut transport`
//! borrows it, and the transport outlives the framer untouched.

mod memory;
mod stream;

use std::io::{self, IoSlice};
use std::time::Duration;

use bytes::Bytes;

pub use memory::MemoryTransport;
pub use stream::{Socket, StreamTransport};

/// Readiness notification raised by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// New bytes can be read.
    Readable,
    /// The transport is about to be torn down.
    AboutToClose,
    /// This many previously written bytes left the transport, in write order.
    BytesFlushed(usize),
}

/// A duplex byte transport.
pub trait Transport {
    /// Write all of `data`, in order.
    ///
    /// Completion is reported later through [`TransportEvent::BytesFlushed`].
    fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Write several buffers as one logical write.
    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        for buf in bufs {
            self.write(buf)?;
        }
        Ok(())
    }

    /// Read up to `max` bytes that are already buffered. Never blocks.
    ///
    /// May return fewer bytes than requested, including none.
    fn read(&mut self, max: usize) -> io::Result<Bytes>;

    /// Number of bytes that can be read without blocking.
    fn bytes_available(&self) -> usize;

    /// Block until new bytes arrive or `timeout` elapses.
    ///
    /// Returns `true` only for bytes that arrived after the last
    /// [`TransportEvent::Readable`] was handed out, so bytes already sitting in
    /// the buffer do not count. `None` waits without a deadline.
    fn wait_for_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool>;

    /// Take the next pending event, if any.
    fn next_event(&mut self) -> io::Result<Option<TransportEvent>>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write(data)
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        (**self).write_vectored(bufs)
    }

    fn read(&mut self, max: usize) -> io::Result<Bytes> {
        (**self).read(max)
    }

    fn bytes_available(&self) -> usize {
        (**self).bytes_available()
    }

    fn wait_for_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        (**self).wait_for_readable(timeout)
    }

    fn next_event(&mut self) -> io::Result<Option<TransportEvent>> {
        (**self).next_event()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).write(data)
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        (**self).write_vectored(bufs)
    }

    fn read(&mut self, max: usize) -> io::Result<Bytes> {
        (**self).read(max)
    }

    fn bytes_available(&self) -> usize {
        (**self).bytes_available()
    }

    fn wait_for_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        (**self).wait_for_readable(timeout)
    }

    fn next_event(&mut self) -> io::Result<Option<TransportEvent>> {
        (**self).next_event()
    }
}
