/*!
 * Deadline Guards
 *
 * Bounded execution for blocks, functions and async task groups.
 *
 * ## Design Principles
 *
 * 1. **One State Machine**: Every activation moves Idle -> Armed -> {Fired | Disarmed}
 * 2. **Owned Timer Source**: The process-wide expiry source is an injected `TimerService`
 * 3. **Explicit Policy**: Expiry is either suppressed (`None`) or propagated (`Err`)
 * 4. **Guaranteed Release**: The expiry source is released on every exit path
 * 5. **Observable**: Armed, succeeded and timed-out events are traced and counted
 *
 * ## Guard Types
 *
 * - **SignalInterruptGuard**: Scoped blocks and decorated functions on the control thread
 * - **CooperativeCancelGuard**: Groups of async tasks, cancelled at their next `.await`
 *
 * ## Example
 *
 * ```rust,no_run
 * use deadline_guard::core::guard::{SignalInterruptGuard, TimerService};
 * use std::sync::Arc;
 * use std::time::Duration;
 *
 * let service = Arc::new(TimerService::with_clock());
 * let guard = SignalInterruptGuard::new(service, Duration::from_secs(1)).unwrap();
 *
 * let result = guard.run(|scope| {
 *     scope.sleep(Duration::from_millis(500))?;
 *     Ok("Ok!")
 * });
 * assert_eq!(result.unwrap(), Some("Ok!"));
 * ```
 */

mod async_task;
mod observe;
mod phase;
mod signal;
mod source;
mod timeout;
mod timer;
mod traits;

pub use async_task::{CooperativeCancelGuard, GroupExpired, GroupReport, Outcome, TaskGroup, TaskOutcome};
pub use observe::ActivationSpan;
pub use phase::{Phase, PhaseCell};
pub use signal::{Activation, Scope, SignalInterruptGuard};
#[cfg(unix)]
pub use source::AlarmSignal;
pub use source::{DeadlineClock, ExpirySource};
pub use timeout::{ExpiryPolicy, GuardConfig};
pub use timer::{ActivationId, Lease, TimerService};
pub use traits::TimeoutGuard;

use std::convert::Infallible;
use std::time::{Duration, Instant};

/// Result type for guard operations
pub type GuardResult<T> = Result<T, GuardError>;

/// The deadline of an activation elapsed
///
/// This is the only error a guard raises inside the guarded work. It carries
/// the configured duration so callers can tell which guard expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {}ms expired", duration.as_millis())]
pub struct ExpiredError {
    duration: Duration,
}

impl ExpiredError {
    #[inline]
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Duration the guard was configured with
    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Misuse of the expiry source or invalid configuration
///
/// Returned when arming fails. Never produced by the expiry itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("Expiry source already held by activation {holder}")]
    SourceBusy { holder: ActivationId },

    #[error("Expiry source is bound to its control thread")]
    ForeignThread,

    #[error("Invalid duration: {0:?}")]
    InvalidDuration(Duration),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Expiry source failure: {0}")]
    Source(String),
}

/// Outcome error of a guarded call
///
/// `Operation` carries the work's own error unchanged. `Guard` means the
/// activation never armed, so the work never ran.
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E = Infallible> {
    #[error(transparent)]
    Expired(#[from] ExpiredError),

    #[error("Operation failed: {0}")]
    Operation(#[source] E),

    #[error(transparent)]
    Guard(#[from] GuardError),
}

impl<E> TimeoutError<E> {
    /// Check if this is an expiry
    #[inline(always)]
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }

    /// Check if this is an operation error
    #[inline(always)]
    pub fn is_operation_error(&self) -> bool {
        matches!(self, Self::Operation(_))
    }

    /// Get the expiry, if that is what this is
    pub fn expired(&self) -> Option<&ExpiredError> {
        match self {
            Self::Expired(e) => Some(e),
            _ => None,
        }
    }

    /// Get the work's own error, if that is what this is
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl TimeoutError<Infallible> {
    /// Widen an infallible outcome into one carrying operation errors
    pub fn widen<E>(self) -> TimeoutError<E> {
        match self {
            Self::Expired(e) => TimeoutError::Expired(e),
            Self::Operation(never) => match never {},
            Self::Guard(e) => TimeoutError::Guard(e),
        }
    }
}

/// Guard metadata for observability
#[derive(Debug, Clone)]
pub struct GuardMetadata {
    pub resource_type: &'static str,
    pub creation_time: Instant,
    pub label: Option<String>,
}

impl GuardMetadata {
    #[inline]
    pub fn new(resource_type: &'static str) -> Self {
        Self {
            resource_type,
            creation_time: Instant::now(),
            label: None,
        }
    }

    /// Attach a human-readable label (e.g. the wrapped function's name)
    #[inline]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
