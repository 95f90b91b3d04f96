//! In-memory duplex transport.
//!
//! [`MemoryTransport::pair`] returns two connected endpoints. Bytes written on
//! one side become readable on the other. Both endpoints share one mutex and
//! condvar, so they can live on different threads and a blocking
//! [`wait_for_readable`](Transport::wait_for_readable) wakes up as soon as the
//! peer writes.
//!
//! # Example
//!
//! ```
//! use packetwire::transport::{MemoryTransport, Transport, TransportEvent};
//!
//! let (mut a, mut b) = MemoryTransport::pair();
//! a.write(b"ping").unwrap();
//!
//! assert_eq!(b.next_event().unwrap(), Some(TransportEvent::Readable));
//! assert_eq!(&b.read(16).unwrap()[..], b"ping");
//! assert_eq!(a.next_event().unwrap(), Some(TransportEvent::BytesFlushed(4)));
//! ```

use std::collections::VecDeque;
use std::io::{self, IoSlice};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};

use super::{Transport, TransportEvent};

/// State of one endpoint, as seen by both sides.
#[derive(Debug, Default)]
struct Endpoint {
    /// Bytes written by the peer and not yet read.
    inbound: BytesMut,
    /// Events waiting for this endpoint's owner.
    events: VecDeque<TransportEvent>,
    /// Number of peer writes delivered so far.
    arrivals: u64,
    closed: bool,
}

#[derive(Debug, Default)]
struct Shared {
    ends: [Endpoint; 2],
}

/// One end of an in-memory duplex pipe.
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Arc<(Mutex<Shared>, Condvar)>,
    side: usize,
    /// Arrival count covered by the last `Readable` handed out.
    observed: u64,
    /// Split flush reports into chunks of this size.
    flush_chunk: Option<usize>,
}

impl MemoryTransport {
    /// Create two connected endpoints.
    pub fn pair() -> (Self, Self) {
        let shared = Arc::new((Mutex::new(Shared::default()), Condvar::new()));
        let a = Self {
            shared: shared.clone(),
            side: 0,
            observed: 0,
            flush_chunk: None,
        };
        let b = Self {
            shared,
            side: 1,
            observed: 0,
            flush_chunk: None,
        };
        (a, b)
    }

    /// Report flushed bytes in chunks of at most `chunk` bytes.
    ///
    /// Emulates a transport that drains its write buffer piecemeal.
    pub fn with_flush_chunk(mut self, chunk: usize) -> Self {
        self.flush_chunk = Some(chunk.max(1));
        self
    }

    /// Close the pipe.
    ///
    /// Raises `AboutToClose` on both endpoints, after any `Readable` already
    /// queued, and wakes a peer blocked in `wait_for_readable`. Closing twice,
    /// or closing after the peer did, is a no-op.
    pub fn close(&mut self) {
        let (_, cvar) = &*self.shared;
        let mut shared = self.lock();
        if shared.ends[self.side].closed {
            return;
        }
        for end in shared.ends.iter_mut() {
            end.closed = true;
            end.events.push_back(TransportEvent::AboutToClose);
        }
        drop(shared);
        cvar.notify_all();
    }

    /// Check whether the pipe has been closed from either side.
    pub fn is_closed(&self) -> bool {
        self.lock().ends[self.side].closed
    }

    #[inline]
    fn peer(&self) -> usize {
        1 - self.side
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MemoryTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_vectored(&[IoSlice::new(data)])
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<()> {
        let (_, cvar) = &*self.shared;
        let mut shared = self.lock();
        if shared.ends[self.side].closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "memory transport closed",
            ));
        }
        let len: usize = bufs.iter().map(|b| b.len()).sum();
        if len == 0 {
            return Ok(());
        }

        let peer = &mut shared.ends[self.peer()];
        for buf in bufs {
            peer.inbound.extend_from_slice(buf);
        }
        peer.arrivals += 1;
        peer.events.push_back(TransportEvent::Readable);

        let me = &mut shared.ends[self.side];
        match self.flush_chunk {
            Some(chunk) => {
                let mut left = len;
                while left > 0 {
                    let n = left.min(chunk);
                    me.events.push_back(TransportEvent::BytesFlushed(n));
                    left -= n;
                }
            }
            None => me.events.push_back(TransportEvent::BytesFlushed(len)),
        }

        drop(shared);
        cvar.notify_all();
        Ok(())
    }

    fn read(&mut self, max: usize) -> io::Result<Bytes> {
        let mut shared = self.lock();
        let me = &mut shared.ends[self.side];
        let n = max.min(me.inbound.len());
        Ok(me.inbound.split_to(n).freeze())
    }

    fn bytes_available(&self) -> usize {
        self.lock().ends[self.side].inbound.len()
    }

    fn wait_for_readable(&mut self, timeout: Option<Duration>) -> io::Result<bool> {
        let (_, cvar) = &*self.shared;
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut shared = self.lock();

        loop {
            let me = &shared.ends[self.side];
            if me.arrivals > self.observed {
                return Ok(true);
            }
            if me.closed {
                return Ok(false);
            }

            shared = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    cvar.wait_timeout(shared, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => cvar.wait(shared).unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    fn next_event(&mut self) -> io::Result<Option<TransportEvent>> {
        let mut shared = self.lock();
        let me = &mut shared.ends[self.side];
        let event = me.events.pop_front();
        let arrivals = me.arrivals;
        drop(shared);

        if event == Some(TransportEvent::Readable) {
            self.observed = arrivals;
        }
        Ok(event)
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn drain(t: &mut MemoryTransport) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Some(ev) = t.next_event().unwrap() {
            events.push(ev);
        }
        events
    }

    #[test]
    fn test_write_is_readable_on_peer() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.write(b"hello").unwrap();

        assert_eq!(b.bytes_available(), 5);
        assert_eq!(drain(&mut b), vec![TransportEvent::Readable]);
        assert_eq!(drain(&mut a), vec![TransportEvent::BytesFlushed(5)]);
    }

    #[test]
    fn test_partial_read() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.write(b"abcdef").unwrap();

        assert_eq!(&b.read(4).unwrap()[..], b"abcd");
        assert_eq!(b.bytes_available(), 2);
        assert_eq!(&b.read(100).unwrap()[..], b"ef");
        assert!(b.read(100).unwrap().is_empty());
    }

    #[test]
    fn test_flush_chunking() {
        let (a, _b) = MemoryTransport::pair();
        let mut a = a.with_flush_chunk(4);
        a.write(&[0u8; 10]).unwrap();

        assert_eq!(
            drain(&mut a),
            vec![
                TransportEvent::BytesFlushed(4),
                TransportEvent::BytesFlushed(4),
                TransportEvent::BytesFlushed(2),
            ]
        );
    }

    #[test]
    fn test_wait_ignores_already_signalled_bytes() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.write(b"xy").unwrap();

        assert!(b.wait_for_readable(Some(Duration::ZERO)).unwrap());
        drain(&mut b);

        // Bytes are still buffered, but nothing new arrived.
        assert_eq!(b.bytes_available(), 2);
        assert!(!b.wait_for_readable(Some(Duration::from_millis(10))).unwrap());
    }

    #[test]
    fn test_wait_wakes_on_peer_write() {
        let (mut a, mut b) = MemoryTransport::pair();

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            a.write(b"late").unwrap();
            a
        });

        assert!(b.wait_for_readable(Some(Duration::from_secs(5))).unwrap());
        assert_eq!(b.bytes_available(), 4);
        let _a = writer.join().unwrap();
    }

    #[test]
    fn test_close_raises_about_to_close_once() {
        let (mut a, _b) = MemoryTransport::pair();
        a.close();
        a.close();

        assert_eq!(drain(&mut a), vec![TransportEvent::AboutToClose]);
        assert!(a.is_closed());
    }

    #[test]
    fn test_close_notifies_peer_after_pending_data() {
        let (mut a, mut b) = MemoryTransport::pair();
        a.write(b"last").unwrap();
        a.close();
        b.close();

        assert!(b.is_closed());
        assert_eq!(&b.read(16).unwrap()[..], b"last");
        assert_eq!(
            drain(&mut b),
            vec![TransportEvent::Readable, TransportEvent::AboutToClose]
        );
        assert_eq!(
            drain(&mut a),
            vec![TransportEvent::BytesFlushed(4), TransportEvent::AboutToClose]
        );
    }

    #[test]
    fn test_write_after_close_fails() {
        let (mut a, mut b) = MemoryTransport::pair();
        b.close();

        let err = a.write(b"nope").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_drop_wakes_waiting_peer() {
        let (a, mut b) = MemoryTransport::pair();

        let dropper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(a);
        });

        let start = Instant::now();
        assert!(!b.wait_for_readable(None).unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
        dropper.join().unwrap();
    }
}
