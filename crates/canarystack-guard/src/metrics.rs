//! Atomic counters for stack observability.
//!
//! All counters use relaxed ordering. They are advisory/diagnostic,
//! not synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-stack operation counters.
#[derive(Debug)]
pub struct StackMetrics {
    /// Successful `create` calls.
    pub creates: AtomicU64,
    /// Elements pushed.
    pub pushes: AtomicU64,
    /// Elements popped.
    pub pops: AtomicU64,
    /// Successful `destroy` calls.
    pub destroys: AtomicU64,
    /// Reallocations that increased capacity.
    pub grows: AtomicU64,
    /// Reallocations that decreased capacity.
    pub shrinks: AtomicU64,
    /// Verifier runs.
    pub verifications: AtomicU64,
    /// Verifier runs that reported at least one flag.
    pub verification_failures: AtomicU64,
    /// Allocation requests that failed.
    pub allocation_failures: AtomicU64,
    /// Pops attempted on an empty stack.
    pub pop_from_empty: AtomicU64,
}

impl StackMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            creates: AtomicU64::new(0),
            pushes: AtomicU64::new(0),
            pops: AtomicU64::new(0),
            destroys: AtomicU64::new(0),
            grows: AtomicU64::new(0),
            shrinks: AtomicU64::new(0),
            verifications: AtomicU64::new(0),
            verification_failures: AtomicU64::new(0),
            allocation_failures: AtomicU64::new(0),
            pop_from_empty: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            creates: Self::get(&self.creates),
            pushes: Self::get(&self.pushes),
            pops: Self::get(&self.pops),
            destroys: Self::get(&self.destroys),
            grows: Self::get(&self.grows),
            shrinks: Self::get(&self.shrinks),
            verifications: Self::get(&self.verifications),
            verification_failures: Self::get(&self.verification_failures),
            allocation_failures: Self::get(&self.allocation_failures),
            pop_from_empty: Self::get(&self.pop_from_empty),
        }
    }
}

impl Default for StackMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all stack counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub creates: u64,
    pub pushes: u64,
    pub pops: u64,
    pub destroys: u64,
    pub grows: u64,
    pub shrinks: u64,
    pub verifications: u64,
    pub verification_failures: u64,
    pub allocation_failures: u64,
    pub pop_from_empty: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let m = StackMetrics::new();
        let snap = m.snapshot();
        assert_eq!(snap.pushes, 0);
        assert_eq!(snap.verification_failures, 0);
    }

    #[test]
    fn increment_works() {
        let m = StackMetrics::new();
        StackMetrics::inc(&m.pushes);
        StackMetrics::inc(&m.pushes);
        StackMetrics::inc(&m.grows);
        let snap = m.snapshot();
        assert_eq!(snap.pushes, 2);
        assert_eq!(snap.grows, 1);
        assert_eq!(snap.pops, 0);
    }
}
