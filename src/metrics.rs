// ═══════════════════════════════════════════════════════════════
// METRICS - Per-scan counters
// ═══════════════════════════════════════════════════════════════
//
// One ScanMetrics per scan session. Workers bump it lock-free as probes are
// dispatched and completed; the coordinator snapshots it into the summary
// when the scan resolves. The completed counter only ever goes up, which is
// what progress reporting leans on.

use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;

use crate::models::ProbeOutcome;

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub dispatched: u64,
    pub completed: u64,
    pub found: u64,
    pub not_found: u64,
    pub blocked: u64,
    pub error: u64,
    pub unknown: u64,
    pub peak_in_flight: u64,
}

impl MetricsSnapshot {
    pub fn count(&self, outcome: ProbeOutcome) -> u64 {
        match outcome {
            ProbeOutcome::Found => self.found,
            ProbeOutcome::NotFound => self.not_found,
            ProbeOutcome::Blocked => self.blocked,
            ProbeOutcome::Error => self.error,
            ProbeOutcome::Unknown => self.unknown,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanMetrics {
    dispatched: AtomicU64,
    completed: AtomicU64,
    found: AtomicU64,
    not_found: AtomicU64,
    blocked: AtomicU64,
    error: AtomicU64,
    unknown: AtomicU64,
    peak_in_flight: AtomicU64,
}

impl ScanMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatch and the in-flight count right after it.
    pub fn record_dispatch(&self, in_flight: u64) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.peak_in_flight.fetch_max(in_flight, Ordering::Relaxed);
    }

    /// Record a completed probe. Returns the new completed count.
    pub fn record_outcome(&self, outcome: ProbeOutcome) -> u64 {
        let counter = match outcome {
            ProbeOutcome::Found => &self.found,
            ProbeOutcome::NotFound => &self.not_found,
            ProbeOutcome::Blocked => &self.blocked,
            ProbeOutcome::Error => &self.error,
            ProbeOutcome::Unknown => &self.unknown,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            found: self.found.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_are_counted() {
        let metrics = ScanMetrics::new();
        assert_eq!(metrics.record_outcome(ProbeOutcome::Found), 1);
        assert_eq!(metrics.record_outcome(ProbeOutcome::Found), 2);
        assert_eq!(metrics.record_outcome(ProbeOutcome::Blocked), 3);

        let snap = metrics.snapshot();
        assert_eq!(snap.completed, 3);
        assert_eq!(snap.count(ProbeOutcome::Found), 2);
        assert_eq!(snap.count(ProbeOutcome::Blocked), 1);
        assert_eq!(snap.count(ProbeOutcome::Error), 0);
    }

    #[test]
    fn test_peak_in_flight_keeps_maximum() {
        let metrics = ScanMetrics::new();
        metrics.record_dispatch(1);
        metrics.record_dispatch(3);
        metrics.record_dispatch(2);
        let snap = metrics.snapshot();
        assert_eq!(snap.dispatched, 3);
        assert_eq!(snap.peak_in_flight, 3);
    }
}
