//! Operational counters for the worker pool.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters updated by the pool and its workers.
///
/// All updates are relaxed; the counters are operational visibility, not
/// synchronization.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Tasks accepted by `submit`.
    pub tasks_submitted: AtomicU64,
    /// Tasks that ran to completion.
    pub tasks_executed: AtomicU64,
    /// Tasks that panicked while running.
    pub tasks_panicked: AtomicU64,
    /// Tasks handed directly to a waiting worker.
    pub direct_handoffs: AtomicU64,
    /// Tasks buffered because the pool was at maximum size.
    pub tasks_buffered: AtomicU64,
    /// Tasks admitted through the force-admission fallback.
    pub forced_admissions: AtomicU64,
    /// Workers spawned over the pool's lifetime.
    pub workers_spawned: AtomicU64,
    /// Workers retired after an idle keep-alive.
    pub workers_retired: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            tasks_panicked: self.tasks_panicked.load(Ordering::Relaxed),
            direct_handoffs: self.direct_handoffs.load(Ordering::Relaxed),
            tasks_buffered: self.tasks_buffered.load(Ordering::Relaxed),
            forced_admissions: self.forced_admissions.load(Ordering::Relaxed),
            workers_spawned: self.workers_spawned.load(Ordering::Relaxed),
            workers_retired: self.workers_retired.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`Metrics`] at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_executed: u64,
    pub tasks_panicked: u64,
    pub direct_handoffs: u64,
    pub tasks_buffered: u64,
    pub forced_admissions: u64,
    pub workers_spawned: u64,
    pub workers_retired: u64,
}

impl MetricsSnapshot {
    /// Tasks finished one way or the other, including panicked ones.
    pub fn tasks_completed(&self) -> u64 {
        self.tasks_executed + self.tasks_panicked
    }
}
