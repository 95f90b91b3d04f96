//! Outgoing send ledger.
//!
//! Tracks bytes handed to the transport that have not been confirmed flushed,
//! one entry per sent frame. Transports flush in write order, so flush reports
//! are charged against the oldest entry first.
//!
//! # Invariant
//!
//! The sum of all entries equals the number of bytes written to the transport
//! and not yet reported by [`TransportEvent::BytesFlushed`](crate::transport::TransportEvent).

use std::collections::VecDeque;

/// FIFO of pending frame byte counts.
#[derive(Debug, Default, Clone)]
pub struct SendLedger {
    entries: VecDeque<usize>,
    /// Running sum of `entries`.
    total: usize,
}

impl SendLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame of `len` bytes handed to the transport.
    #[inline]
    pub fn push(&mut self, len: usize) {
        debug_assert!(len > 0, "ledger entries are never empty");
        self.entries.push_back(len);
        self.total += len;
    }

    /// Drop the most recent entry (its write failed before reaching the transport).
    pub fn retract_last(&mut self) {
        if let Some(len) = self.entries.pop_back() {
            self.total -= len;
        }
    }

    /// Charge `n` flushed bytes against the oldest entries.
    ///
    /// Returns how many entries were fully flushed and removed.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if `n` exceeds the pending total. Transports
    /// never report more than was written; release builds log and clamp.
    pub fn release(&mut self, mut n: usize) -> usize {
        debug_assert!(
            n <= self.total,
            "flushed {} bytes but only {} pending",
            n,
            self.total
        );

        let mut completed = 0;
        while n > 0 {
            let Some(front) = self.entries.front_mut() else {
                tracing::warn!("Transport reported {} more flushed bytes than written", n);
                break;
            };

            if *front > n {
                *front -= n;
                self.total -= n;
                n = 0;
            } else {
                n -= *front;
                self.total -= *front;
                self.entries.pop_front();
                completed += 1;
            }
        }
        completed
    }

    /// Number of bytes written but not yet flushed.
    #[inline]
    pub fn pending_bytes(&self) -> usize {
        self.total
    }

    /// Number of frames with unflushed bytes.
    #[inline]
    pub fn pending_frames(&self) -> usize {
        self.entries.len()
    }

    /// Check if every written byte has been flushed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget all pending entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_creation() {
        let ledger = SendLedger::new();
        assert!(ledger.is_empty());
        assert_eq!(ledger.pending_bytes(), 0);
        assert_eq!(ledger.pending_frames(), 0);
    }

    #[test]
    fn test_push_accumulates() {
        let mut ledger = SendLedger::new();
        ledger.push(10);
        ledger.push(5);

        assert_eq!(ledger.pending_bytes(), 15);
        assert_eq!(ledger.pending_frames(), 2);
    }

    #[test]
    fn test_release_exact_entry() {
        let mut ledger = SendLedger::new();
        ledger.push(10);
        ledger.push(5);

        assert_eq!(ledger.release(10), 1);
        assert_eq!(ledger.pending_bytes(), 5);
        assert_eq!(ledger.pending_frames(), 1);
    }

    #[test]
    fn test_release_partial_entry() {
        let mut ledger = SendLedger::new();
        ledger.push(10);

        assert_eq!(ledger.release(3), 0);
        assert_eq!(ledger.pending_bytes(), 7);
        assert_eq!(ledger.pending_frames(), 1);

        assert_eq!(ledger.release(7), 1);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_release_spans_entries() {
        let mut ledger = SendLedger::new();
        ledger.push(4);
        ledger.push(6);
        ledger.push(8);

        // Finishes the first two, eats 2 bytes of the third.
        assert_eq!(ledger.release(12), 2);
        assert_eq!(ledger.pending_bytes(), 6);
        assert_eq!(ledger.pending_frames(), 1);
    }

    #[test]
    fn test_any_chunking_empties_ledger() {
        let sizes = [5usize, 1, 4100, 9, 4];
        let total: usize = sizes.iter().sum();

        for chunk in [1usize, 3, 7, 64, 4096, total] {
            let mut ledger = SendLedger::new();
            for &s in &sizes {
                ledger.push(s);
            }

            let mut completed = 0;
            let mut left = total;
            while left > 0 {
                let n = chunk.min(left);
                completed += ledger.release(n);
                left -= n;
            }

            assert!(ledger.is_empty(), "chunk size {}", chunk);
            assert_eq!(ledger.pending_bytes(), 0);
            assert_eq!(completed, sizes.len());
        }
    }

    #[test]
    fn test_retract_last() {
        let mut ledger = SendLedger::new();
        ledger.push(4);
        ledger.push(9);
        ledger.retract_last();

        assert_eq!(ledger.pending_bytes(), 4);
        assert_eq!(ledger.pending_frames(), 1);
    }

    #[test]
    fn test_clear() {
        let mut ledger = SendLedger::new();
        ledger.push(4);
        ledger.push(9);
        ledger.release(2);
        ledger.clear();

        assert!(ledger.is_empty());
        assert_eq!(ledger.pending_bytes(), 0);
    }

    #[test]
    #[should_panic(expected = "only 4 pending")]
    #[cfg(debug_assertions)]
    fn test_over_release_panics_in_debug() {
        let mut ledger = SendLedger::new();
        ledger.push(4);
        ledger.release(5);
    }
}
