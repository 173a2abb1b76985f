/*!
 * Signal-Interrupt Guard
 *
 * Scoped-block and decorator adapters for synchronous work on the control
 * thread. The expiry is delivered at the work's next checkpoint as an
 * `ExpiredError`, which unwinds the work through `?`.
 *
 * ## Example
 *
 * ```ignore
 * let guard = SignalInterruptGuard::new(service, Duration::from_secs(5))?;
 *
 * // Scoped block
 * let value = guard.run(|scope| {
 *     scope.sleep(Duration::from_secs(1))?;
 *     Ok(42)
 * })?;
 *
 * // Decorator
 * let foo = guard.decorate(|scope, n: u64| {
 *     scope.sleep(Duration::from_secs(n))?;
 *     Ok("Ok!")
 * });
 * assert_eq!(foo(10)?, None);
 * ```
 *
 * Nesting two activations on one `TimerService` is rejected with
 * `GuardError::SourceBusy`; the source holds a single pending expiry.
 */

use super::observe::ActivationSpan;
use super::phase::{Phase, PhaseCell};
use super::timer::{ActivationId, Lease, TimerService};
use super::traits::TimeoutGuard;
use super::{ExpiredError, ExpiryPolicy, GuardConfig, GuardMetadata, GuardResult, TimeoutError};
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

const RESOURCE_TYPE: &str = "signal_interrupt";

/// Guard for blocks and functions running on the control thread
#[derive(Debug, Clone)]
pub struct SignalInterruptGuard {
    config: GuardConfig,
    service: Arc<TimerService>,
    metadata: GuardMetadata,
}

impl SignalInterruptGuard {
    /// Create a suppressing guard
    pub fn new(service: Arc<TimerService>, duration: Duration) -> GuardResult<Self> {
        Ok(Self::from_config(service, GuardConfig::new(duration)?))
    }

    /// Create a guard with an explicit policy
    pub fn with_policy(service: Arc<TimerService>, duration: Duration, policy: ExpiryPolicy) -> GuardResult<Self> {
        Ok(Self::from_config(service, GuardConfig::new(duration)?.with_policy(policy)))
    }

    pub fn from_config(service: Arc<TimerService>, config: GuardConfig) -> Self {
        Self {
            config,
            service,
            metadata: GuardMetadata::new(RESOURCE_TYPE),
        }
    }

    /// Label used in traces (e.g. the decorated function's name)
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_label(label);
        self
    }

    pub fn service(&self) -> &Arc<TimerService> {
        &self.service
    }

    /// Arm a fresh activation
    ///
    /// The returned [`Activation`] holds the expiry source until it is
    /// exited or dropped, whichever comes first.
    pub fn enter(&self) -> GuardResult<Activation<'_>> {
        let lease = self.service.arm(self.config.duration())?;
        let span = ActivationSpan::armed(
            RESOURCE_TYPE,
            self.metadata.label.as_deref(),
            Some(lease.id()),
            self.config.duration(),
            self.service.stats().clone(),
        );

        let phase = PhaseCell::new();
        phase.arm();

        Ok(Activation {
            scope: Scope {
                lease,
                phase,
                span,
                config: &self.config,
            },
        })
    }

    /// Run a block under the deadline
    ///
    /// - `Ok(Some(v))`: finished in time
    /// - `Ok(None)`: expired under `Suppress`
    /// - `Err(Expired)`: expired under `Propagate`
    /// - `Err(Guard)`: the source could not be armed; the block never ran
    pub fn run<T, F>(&self, work: F) -> Result<Option<T>, TimeoutError>
    where
        F: FnOnce(&Scope<'_>) -> Result<T, ExpiredError>,
    {
        let activation = self.enter()?;
        let result = work(activation.scope()).map_err(TimeoutError::Expired);
        activation.exit(result)
    }

    /// Run a fallible block under the deadline
    ///
    /// The block reports its own errors as `TimeoutError::Operation`; they
    /// reach the caller unchanged after the source is released.
    pub fn try_run<T, E, F>(&self, work: F) -> Result<Option<T>, TimeoutError<E>>
    where
        F: FnOnce(&Scope<'_>) -> Result<T, TimeoutError<E>>,
    {
        let activation = self.enter()?;
        let result = work(activation.scope());
        activation.exit(result)
    }

    /// Wrap a function so every call runs as its own activation
    ///
    /// The wrapped function takes the same argument (use a tuple for several).
    /// Calls may repeat but must not overlap.
    pub fn decorate<A, T, F>(&self, f: F) -> impl Fn(A) -> Result<Option<T>, TimeoutError>
    where
        F: Fn(&Scope<'_>, A) -> Result<T, ExpiredError>,
    {
        let guard = self.clone();
        move |args| guard.run(|scope| f(scope, args))
    }

    /// Fallible counterpart of [`decorate`](Self::decorate)
    pub fn try_decorate<A, T, E, F>(&self, f: F) -> impl Fn(A) -> Result<Option<T>, TimeoutError<E>>
    where
        F: Fn(&Scope<'_>, A) -> Result<T, TimeoutError<E>>,
    {
        let guard = self.clone();
        move |args| guard.try_run(|scope| f(scope, args))
    }
}

impl TimeoutGuard for SignalInterruptGuard {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn metadata(&self) -> &GuardMetadata {
        &self.metadata
    }

    fn config(&self) -> &GuardConfig {
        &self.config
    }
}

/// Interruption-check handle passed to guarded work
pub struct Scope<'g> {
    lease: Lease<'g>,
    phase: PhaseCell,
    span: ActivationSpan,
    config: &'g GuardConfig,
}

impl<'g> Scope<'g> {
    #[inline]
    pub fn id(&self) -> ActivationId {
        self.lease.id()
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    #[inline]
    pub fn deadline(&self) -> Instant {
        self.lease.deadline()
    }

    #[inline]
    pub fn remaining(&self) -> Duration {
        self.lease.remaining()
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.span.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.poll() == Phase::Fired
    }

    /// Interruption-check point
    ///
    /// Returns `Err(ExpiredError)` once the expiry has been delivered; use `?`
    /// to unwind the work.
    #[inline]
    pub fn checkpoint(&self) -> Result<(), ExpiredError> {
        match self.poll() {
            Phase::Fired => Err(self.expired()),
            _ => Ok(()),
        }
    }

    /// Sleep that wakes up at the deadline
    ///
    /// A duration too large to add to the clock sleeps until the deadline.
    pub fn sleep(&self, duration: Duration) -> Result<(), ExpiredError> {
        let end = Instant::now().checked_add(duration);
        loop {
            self.checkpoint()?;

            let now = Instant::now();
            let left = match end {
                Some(end) if now >= end => return Ok(()),
                Some(end) => end - now,
                None => Duration::MAX,
            };

            let mut step = left.min(self.config.poll_interval());
            let until_deadline = self.lease.remaining();
            if !until_deadline.is_zero() {
                step = step.min(until_deadline);
            }
            thread::sleep(step);
        }
    }

    /// Run a blocking call, retrying after `EINTR` until the deadline fires
    ///
    /// With the alarm source the expiry itself interrupts the call, so a
    /// blocked read returns as soon as the alarm is delivered.
    pub fn retry_interrupted<T>(
        &self,
        mut call: impl FnMut() -> io::Result<T>,
    ) -> Result<T, TimeoutError<io::Error>> {
        loop {
            self.checkpoint()?;
            match call() {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other.map_err(TimeoutError::Operation),
            }
        }
    }

    fn expired(&self) -> ExpiredError {
        ExpiredError::new(self.config.duration())
    }

    /// Pick up a delivered expiry
    fn poll(&self) -> Phase {
        if self.phase.get() == Phase::Armed && self.lease.is_fired() && self.phase.fire() {
            self.span.timed_out();
        }
        self.phase.get()
    }

    fn disarm(&self) -> bool {
        if self.poll().is_settled() || !self.phase.disarm() {
            return false;
        }
        self.lease.release();
        self.span.succeeded();
        true
    }
}

/// One armed run of a [`SignalInterruptGuard`]
///
/// Dropping an armed activation (e.g. while unwinding a panic) cancels the
/// expiry and releases the source without reporting success.
pub struct Activation<'g> {
    scope: Scope<'g>,
}

impl<'g> Activation<'g> {
    #[inline]
    pub fn scope(&self) -> &Scope<'g> {
        &self.scope
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.scope.poll()
    }

    /// Cancel the pending expiry
    ///
    /// Idempotent. Returns `false` if the activation already settled.
    pub fn disarm(&self) -> bool {
        self.scope.disarm()
    }

    /// Settle the activation and apply the exit policy to the work's result
    ///
    /// A value that arrives after the expiry fired is discarded. Errors other
    /// than this activation's own expiry pass through unchanged.
    pub fn exit<T, E>(self, result: Result<T, TimeoutError<E>>) -> Result<Option<T>, TimeoutError<E>> {
        match result {
            Ok(value) => {
                if self.scope.disarm() || self.scope.phase() == Phase::Disarmed {
                    Ok(Some(value))
                } else {
                    self.expire()
                }
            }
            Err(TimeoutError::Expired(err)) => {
                if self.scope.poll() == Phase::Fired {
                    self.expire()
                } else {
                    self.scope.disarm();
                    Err(TimeoutError::Expired(err))
                }
            }
            Err(other) => {
                self.scope.disarm();
                Err(other)
            }
        }
    }

    fn expire<T, E>(&self) -> Result<Option<T>, TimeoutError<E>> {
        match self.scope.config.policy() {
            ExpiryPolicy::Suppress => Ok(None),
            ExpiryPolicy::Propagate => Err(TimeoutError::Expired(self.scope.expired())),
        }
    }
}

impl Drop for Activation<'_> {
    fn drop(&mut self) {
        if self.scope.phase.disarm() {
            debug!(activation = %self.scope.id(), "Activation dropped while armed");
            self.scope.span.abandoned();
        }
        self.scope.lease.release();
    }
}
