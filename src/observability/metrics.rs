//! Bootstrap counters
//!
//! Counters only, monotonic, reset on process start.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for reconciliation activity
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    passes_started: AtomicU64,
    passes_completed: AtomicU64,
    passes_failed: AtomicU64,
    election_conflicts: AtomicU64,
    grants_created: AtomicU64,
    replicas_attached: AtomicU64,
    attach_failures: AtomicU64,
    markers_published: AtomicU64,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    pub passes_started: u64,
    pub passes_completed: u64,
    pub passes_failed: u64,
    pub election_conflicts: u64,
    pub grants_created: u64,
    pub replicas_attached: u64,
    pub attach_failures: u64,
    pub markers_published: u64,
}

impl MetricsRegistry {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_passes_started(&self) {
        self.passes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_passes_completed(&self) {
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_passes_failed(&self) {
        self.passes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_election_conflicts(&self) {
        self.election_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_grants_created(&self) {
        self.grants_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_replicas_attached(&self) {
        self.replicas_attached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_attach_failures(&self) {
        self.attach_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_markers_published(&self) {
        self.markers_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            passes_started: self.passes_started.load(Ordering::Relaxed),
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            passes_failed: self.passes_failed.load(Ordering::Relaxed),
            election_conflicts: self.election_conflicts.load(Ordering::Relaxed),
            grants_created: self.grants_created.load(Ordering::Relaxed),
            replicas_attached: self.replicas_attached.load(Ordering::Relaxed),
            attach_failures: self.attach_failures.load(Ordering::Relaxed),
            markers_published: self.markers_published.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_increments() {
        let metrics = MetricsRegistry::new();
        metrics.increment_passes_started();
        metrics.increment_passes_started();
        metrics.increment_replicas_attached();

        let snap = metrics.snapshot();
        assert_eq!(snap.passes_started, 2);
        assert_eq!(snap.replicas_attached, 1);
        assert_eq!(snap.passes_failed, 0);
    }
}
