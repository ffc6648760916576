//! Sequence numbering for protocol messages.
//!
//! Every envelope carries a monotonically increasing sequence number scoped
//! to its sender. The receiver tracks the numbers it observes: a jump larger
//! than one means frames were lost in transit (the transport preserves
//! ordering, so reordering cannot produce gaps).

use std::sync::atomic::{AtomicU64, Ordering};

/// A thread-safe, monotonically increasing counter for outbound sequence
/// numbers.
///
/// Numbers start at 0 and increment by 1 per [`next`](SequenceCounter::next).
/// The counter wraps at `u64::MAX` without panicking.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    inner: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence number and advances the counter.
    ///
    /// `Relaxed` ordering is sufficient: the value only orders messages, it
    /// does not synchronize memory between threads.
    pub fn next(&self) -> u64 {
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the current value without advancing. Diagnostic use only.
    pub fn current(&self) -> u64 {
        self.inner.load(Ordering::Relaxed)
    }
}

/// A detected discontinuity in inbound sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    /// The number we expected to see next.
    pub expected: u64,
    /// The number that actually arrived.
    pub observed: u64,
}

impl SequenceGap {
    /// How many messages went missing.
    pub fn missing(&self) -> u64 {
        self.observed.saturating_sub(self.expected)
    }
}

/// Observes the sequence numbers of inbound envelopes from one peer.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: Option<u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `sequence` and reports a gap if numbers were skipped.
    ///
    /// A stale number (equal to or below the last observed one) is reported
    /// as a gap with `missing() == 0`; the session logs it and drops nothing,
    /// since the transport guarantees ordering and duplicates indicate a
    /// peer bug rather than network reordering.
    pub fn observe(&mut self, sequence: u64) -> Option<SequenceGap> {
        let gap = match self.last {
            Some(last) if sequence != last.wrapping_add(1) => Some(SequenceGap {
                expected: last.wrapping_add(1),
                observed: sequence,
            }),
            _ => None,
        };
        self.last = Some(sequence);
        gap
    }

    /// Forgets all history, e.g. when a new connection replaces the old one.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counter_starts_at_zero_and_increments() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 0);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn test_counter_wraps_at_u64_max() {
        let counter = SequenceCounter {
            inner: AtomicU64::new(u64::MAX),
        };
        assert_eq!(counter.next(), u64::MAX);
        assert_eq!(counter.next(), 0);
    }

    #[test]
    fn test_counter_values_are_unique_across_threads() {
        let counter = Arc::new(SequenceCounter::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..500).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 2000, "no two threads may share a number");
    }

    #[test]
    fn test_tracker_accepts_consecutive_numbers_silently() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(0), None);
        assert_eq!(tracker.observe(1), None);
        assert_eq!(tracker.observe(2), None);
    }

    #[test]
    fn test_tracker_first_observation_never_reports_a_gap() {
        // A session may attach mid-stream; the first number is the baseline.
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe(4711), None);
    }

    #[test]
    fn test_tracker_reports_gap_with_missing_count() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(5);
        let gap = tracker.observe(9).expect("gap expected");
        assert_eq!(gap.expected, 6);
        assert_eq!(gap.observed, 9);
        assert_eq!(gap.missing(), 3);
    }

    #[test]
    fn test_tracker_reports_stale_number_as_zero_missing() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(5);
        let gap = tracker.observe(5).expect("duplicate must be flagged");
        assert_eq!(gap.missing(), 0);
    }

    #[test]
    fn test_tracker_resumes_cleanly_after_reset() {
        let mut tracker = SequenceTracker::new();
        tracker.observe(100);
        tracker.reset();
        assert_eq!(tracker.observe(0), None);
    }
}
