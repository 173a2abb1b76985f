/*!
 * Lock-Free Timeout Statistics
 * Atomic counters for the guard lifecycle, shared across activations
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic guard statistics
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - All operations use relaxed ordering
#[repr(C, align(64))]
#[derive(Debug)]
pub struct TimeoutStats {
    armed: AtomicU64,
    succeeded: AtomicU64,
    timed_out: AtomicU64,
    abandoned: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_cancelled: AtomicU64,
}

impl TimeoutStats {
    #[inline]
    pub const fn new() -> Self {
        Self {
            armed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_cancelled: AtomicU64::new(0),
        }
    }

    #[inline(always)]
    pub fn inc_armed(&self) {
        self.armed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Activation dropped while armed (e.g. unwound by a panic)
    #[inline(always)]
    pub fn inc_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the settled tasks of one async group
    #[inline]
    pub fn add_tasks(&self, completed: u64, failed: u64, cancelled: u64) {
        self.tasks_completed.fetch_add(completed, Ordering::Relaxed);
        self.tasks_failed.fetch_add(failed, Ordering::Relaxed);
        self.tasks_cancelled.fetch_add(cancelled, Ordering::Relaxed);
    }

    /// Get snapshot of current stats
    ///
    /// # Note
    /// Values may be slightly inconsistent with each other under concurrent
    /// updates; each individual value is accurate.
    #[inline]
    pub fn snapshot(&self) -> TimeoutStatsSnapshot {
        TimeoutStatsSnapshot {
            armed: self.armed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.armed,
            &self.succeeded,
            &self.timed_out,
            &self.abandoned,
            &self.tasks_completed,
            &self.tasks_failed,
            &self.tasks_cancelled,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TimeoutStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`TimeoutStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutStatsSnapshot {
    pub armed: u64,
    pub succeeded: u64,
    pub timed_out: u64,
    pub abandoned: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
}

impl TimeoutStatsSnapshot {
    /// Activations still armed (not succeeded, timed out or abandoned)
    pub fn in_flight(&self) -> u64 {
        self.armed
            .saturating_sub(self.succeeded + self.timed_out + self.abandoned)
    }

    /// Fraction of settled activations that timed out
    pub fn timeout_ratio(&self) -> f64 {
        let settled = self.succeeded + self.timed_out;
        if settled == 0 {
            0.0
        } else {
            self.timed_out as f64 / settled as f64
        }
    }
}
