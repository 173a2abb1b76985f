/*!
 * Timer Service
 *
 * Owns the process-wide expiry source and tracks which activation holds it.
 *
 * The source is exclusive: arming while another activation holds it fails
 * with `GuardError::SourceBusy`, and arming from any thread other than the
 * service's control thread fails with `GuardError::ForeignThread`. Both are
 * caller errors, surfaced instead of silently clobbering a pending expiry.
 */

use super::source::{DeadlineClock, ExpirySource};
use super::{GuardError, GuardResult};
use crate::monitoring::TimeoutStats;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::trace;

/// Identifier of one guard activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ActivationId(u64);

impl ActivationId {
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Exclusive owner of the expiry source
pub struct TimerService {
    source: Box<dyn ExpirySource>,
    holder: Mutex<Option<ActivationId>>,
    control_thread: ThreadId,
    next_id: AtomicU64,
    stats: Arc<TimeoutStats>,
}

impl TimerService {
    /// Create a service bound to the calling thread
    pub fn new(source: impl ExpirySource + 'static) -> Self {
        Self {
            source: Box::new(source),
            holder: Mutex::new(None),
            control_thread: thread::current().id(),
            next_id: AtomicU64::new(1),
            stats: Arc::new(TimeoutStats::new()),
        }
    }

    /// Service backed by the monotonic clock
    pub fn with_clock() -> Self {
        Self::new(DeadlineClock::new())
    }

    /// Service backed by the OS alarm timer and `SIGALRM`
    #[cfg(unix)]
    pub fn with_alarm() -> GuardResult<Self> {
        Ok(Self::new(super::source::AlarmSignal::install()?))
    }

    /// Share a stats sink with other services or guards
    pub fn with_stats(mut self, stats: Arc<TimeoutStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Activation currently holding the source
    pub fn holder(&self) -> Option<ActivationId> {
        *self.holder.lock()
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.holder.lock().is_some()
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn stats(&self) -> &Arc<TimeoutStats> {
        &self.stats
    }

    /// Take the source and schedule an expiry `duration` from now
    ///
    /// # Errors
    ///
    /// - `InvalidDuration` if the deadline is not representable
    /// - `ForeignThread` when called off the control thread
    /// - `SourceBusy` while another activation holds the source
    /// - `Source` if the underlying source refuses to arm
    pub fn arm(&self, duration: Duration) -> GuardResult<Lease<'_>> {
        if thread::current().id() != self.control_thread {
            return Err(GuardError::ForeignThread);
        }

        let mut holder = self.holder.lock();
        if let Some(current) = *holder {
            return Err(GuardError::SourceBusy { holder: current });
        }

        let deadline = Instant::now()
            .checked_add(duration)
            .ok_or(GuardError::InvalidDuration(duration))?;
        self.source.arm(duration)?;
        let id = ActivationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        *holder = Some(id);
        drop(holder);

        trace!(activation = %id, source = self.source.name(), "Expiry source armed");

        Ok(Lease {
            service: self,
            id,
            deadline,
            released: AtomicBool::new(false),
        })
    }

    #[inline]
    fn is_fired(&self) -> bool {
        self.source.is_fired()
    }

    fn release(&self, id: ActivationId) {
        let mut holder = self.holder.lock();
        if *holder == Some(id) {
            self.source.cancel();
            *holder = None;
            trace!(activation = %id, "Expiry source released");
        }
    }
}

impl Default for TimerService {
    fn default() -> Self {
        Self::with_clock()
    }
}

impl fmt::Debug for TimerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerService")
            .field("source", &self.source)
            .field("holder", &self.holder())
            .field("control_thread", &self.control_thread)
            .finish()
    }
}

/// Exclusive hold on the expiry source for one activation
///
/// Releasing cancels the pending or delivered expiry and clears the holder
/// marker. Release is idempotent and also runs on drop.
pub struct Lease<'s> {
    service: &'s TimerService,
    id: ActivationId,
    deadline: Instant,
    released: AtomicBool,
}

impl<'s> Lease<'s> {
    #[inline]
    pub fn id(&self) -> ActivationId {
        self.id
    }

    /// Nominal deadline (arm time + duration)
    #[inline]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the nominal deadline
    #[inline]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Check whether the expiry has been delivered to this lease
    #[inline]
    pub fn is_fired(&self) -> bool {
        !self.is_released() && self.service.is_fired()
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Hand the source back
    ///
    /// Returns `false` if the lease was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.service.release(self.id);
        true
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Lease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("remaining", &self.remaining())
            .field("released", &self.is_released())
            .finish()
    }
}
