//! Running high-water mark of resident bytes.
//!
//! Monotone for the life of the tracker; a new session gets a new tracker.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct PeakTracker {
    peak_bytes: AtomicUsize,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self {
            peak_bytes: AtomicUsize::new(0),
        }
    }

    /// Offer a freshly computed live total; raises the peak if higher.
    /// Returns true if the peak moved.
    pub fn observe(&self, candidate_total: usize) -> bool {
        let mut cur = self.peak_bytes.load(Ordering::Relaxed);
        while candidate_total > cur {
            match self.peak_bytes.compare_exchange(
                cur,
                candidate_total,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(
                        live_bytes = candidate_total,
                        previous_peak = cur,
                        "new peak"
                    );
                    return true;
                }
                Err(observed) => cur = observed,
            }
        }
        false
    }

    pub fn current_peak(&self) -> usize {
        self.peak_bytes.load(Ordering::Relaxed)
    }
}
