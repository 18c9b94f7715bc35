//! Byte-count tracking for a single transfer lifecycle.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time view of a transfer's progress.
///
/// `total == 0` means the total is not known yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Bytes transferred so far, including bytes present before a resume.
    pub transferred: u64,
    /// Expected total bytes, or 0 when unknown.
    pub total: u64,
}

impl ProgressSnapshot {
    /// Whole-number percentage in `0..=100`, or `None` while the total is unknown.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        if self.total == 0 {
            return None;
        }
        let done = self.transferred.min(self.total);
        let pct = u128::from(done) * 100 / u128::from(self.total);
        Some(u8::try_from(pct).unwrap_or(100))
    }
}

/// Lock-free transferred/total counters written by the copy loop.
///
/// Only the engine's copy loop advances the counter; readers take snapshots.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    transferred: AtomicU64,
    total: AtomicU64,
}

impl ProgressTracker {
    /// Creates a tracker with both counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a lifecycle at `transferred` bytes (the size of a resumed partial file).
    pub fn reset(&self, transferred: u64) {
        self.transferred.store(transferred, Ordering::SeqCst);
        self.total.store(0, Ordering::SeqCst);
    }

    /// Records the negotiated total.
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    /// Adds `len` bytes and returns the resulting snapshot.
    pub fn advance(&self, len: u64) -> ProgressSnapshot {
        let transferred = self
            .transferred
            .fetch_add(len, Ordering::SeqCst)
            .saturating_add(len);
        ProgressSnapshot {
            transferred,
            total: self.total.load(Ordering::SeqCst),
        }
    }

    /// Current counters.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            transferred: self.transferred.load(Ordering::SeqCst),
            total: self.total.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_unknown_total_is_none() {
        let snapshot = ProgressSnapshot {
            transferred: 10,
            total: 0,
        };
        assert_eq!(snapshot.percent(), None);
    }

    #[test]
    fn test_percent_rounds_down_and_caps_at_100() {
        let half = ProgressSnapshot {
            transferred: 499,
            total: 1000,
        };
        assert_eq!(half.percent(), Some(49));

        let over = ProgressSnapshot {
            transferred: 1200,
            total: 1000,
        };
        assert_eq!(over.percent(), Some(100));
    }

    #[test]
    fn test_percent_handles_huge_values() {
        let snapshot = ProgressSnapshot {
            transferred: u64::MAX - 1,
            total: u64::MAX,
        };
        assert_eq!(snapshot.percent(), Some(99));
    }

    #[test]
    fn test_tracker_advance_is_monotonic() {
        let tracker = ProgressTracker::new();
        tracker.set_total(100);
        let mut last = 0;
        for _ in 0..10 {
            let snapshot = tracker.advance(10);
            assert!(snapshot.transferred > last);
            last = snapshot.transferred;
        }
        assert_eq!(tracker.snapshot().percent(), Some(100));
    }

    #[test]
    fn test_tracker_reset_seeds_resume_offset() {
        let tracker = ProgressTracker::new();
        tracker.set_total(50);
        tracker.advance(20);

        tracker.reset(400);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.transferred, 400);
        assert_eq!(snapshot.total, 0);
    }
}
