/*!
 * Expiry Sources
 *
 * The one-shot notification a `TimerService` arms for the current activation.
 *
 * - **DeadlineClock**: portable, fires lazily when a checkpoint reads the clock
 * - **AlarmSignal**: the OS alarm timer paired with a `SIGALRM` handler (unix)
 */

use super::{GuardError, GuardResult};
use parking_lot::Mutex;
use std::fmt;
use std::time::{Duration, Instant};

/// One-shot expiry notification
///
/// Implementations hold at most one pending expiry. `cancel` must be
/// idempotent and must clear a delivered notification too, so a stale expiry
/// never leaks into the next activation.
pub trait ExpirySource: Send + Sync + fmt::Debug {
    /// Source name for logging
    fn name(&self) -> &'static str;

    /// Schedule the expiry `duration` from now, replacing any pending one
    fn arm(&self, duration: Duration) -> GuardResult<()>;

    /// Drop the pending or delivered expiry
    fn cancel(&self);

    /// Check whether the expiry has been delivered
    fn is_fired(&self) -> bool;
}

/// Monotonic-clock expiry source
#[derive(Debug, Default)]
pub struct DeadlineClock {
    deadline: Mutex<Option<Instant>>,
}

impl DeadlineClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently scheduled deadline
    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }
}

impl ExpirySource for DeadlineClock {
    fn name(&self) -> &'static str {
        "deadline_clock"
    }

    fn arm(&self, duration: Duration) -> GuardResult<()> {
        let deadline = Instant::now()
            .checked_add(duration)
            .ok_or(GuardError::InvalidDuration(duration))?;
        *self.deadline.lock() = Some(deadline);
        Ok(())
    }

    fn cancel(&self) {
        self.deadline.lock().take();
    }

    #[inline]
    fn is_fired(&self) -> bool {
        self.deadline
            .lock()
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

#[cfg(unix)]
pub use alarm::AlarmSignal;

#[cfg(unix)]
mod alarm {
    use super::{ExpirySource, GuardResult};
    use crate::core::guard::GuardError;
    use crate::core::limits::{ALARM_RESOLUTION, MAX_ALARM_SECS};
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use nix::unistd::alarm;
    use parking_lot::Mutex;
    use std::os::raw::c_int;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tracing::{debug, warn};

    /// Set by the signal handler; the only state it touches
    static ALARM_FIRED: AtomicBool = AtomicBool::new(false);

    /// Only one `AlarmSignal` may own the process's `SIGALRM` disposition
    static INSTALLED: AtomicBool = AtomicBool::new(false);

    extern "C" fn on_alarm(_signum: c_int) {
        ALARM_FIRED.store(true, Ordering::SeqCst);
    }

    /// OS alarm timer expiry source
    ///
    /// Installs a `SIGALRM` handler without `SA_RESTART`, so blocking syscalls
    /// on the control thread return `EINTR` when the alarm fires. Durations
    /// round up to whole seconds. The previous handler is restored on drop.
    pub struct AlarmSignal {
        previous: Mutex<Option<SigAction>>,
    }

    impl AlarmSignal {
        /// Install the `SIGALRM` handler
        ///
        /// # Errors
        ///
        /// `GuardError::Source` if another `AlarmSignal` is alive or the
        /// handler cannot be installed.
        pub fn install() -> GuardResult<Self> {
            if INSTALLED.swap(true, Ordering::SeqCst) {
                return Err(GuardError::Source("SIGALRM handler already installed".to_string()));
            }

            let action = SigAction::new(SigHandler::Handler(on_alarm), SaFlags::empty(), SigSet::empty());
            // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
            let previous = match unsafe { sigaction(Signal::SIGALRM, &action) } {
                Ok(previous) => previous,
                Err(e) => {
                    INSTALLED.store(false, Ordering::SeqCst);
                    return Err(GuardError::Source(format!("sigaction(SIGALRM) failed: {}", e)));
                }
            };

            ALARM_FIRED.store(false, Ordering::SeqCst);
            debug!("SIGALRM handler installed");

            Ok(Self {
                previous: Mutex::new(Some(previous)),
            })
        }

        fn whole_seconds(duration: Duration) -> u32 {
            let secs = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
            secs.clamp(ALARM_RESOLUTION.as_secs(), MAX_ALARM_SECS) as u32
        }
    }

    impl ExpirySource for AlarmSignal {
        fn name(&self) -> &'static str {
            "alarm_signal"
        }

        fn arm(&self, duration: Duration) -> GuardResult<()> {
            ALARM_FIRED.store(false, Ordering::SeqCst);
            if let Some(stale) = alarm::set(Self::whole_seconds(duration)) {
                warn!(stale_secs = stale, "Replaced a pending alarm");
            }
            Ok(())
        }

        fn cancel(&self) {
            let _ = alarm::cancel();
            ALARM_FIRED.store(false, Ordering::SeqCst);
        }

        #[inline]
        fn is_fired(&self) -> bool {
            ALARM_FIRED.load(Ordering::SeqCst)
        }
    }

    impl std::fmt::Debug for AlarmSignal {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("AlarmSignal")
                .field("fired", &ALARM_FIRED.load(Ordering::Relaxed))
                .finish()
        }
    }

    impl Drop for AlarmSignal {
        fn drop(&mut self) {
            self.cancel();
            if let Some(previous) = self.previous.lock().take() {
                // SAFETY: restores the disposition that was active before install.
                if let Err(e) = unsafe { sigaction(Signal::SIGALRM, &previous) } {
                    warn!(error = %e, "Failed to restore previous SIGALRM handler");
                }
            }
            INSTALLED.store(false, Ordering::SeqCst);
        }
    }

}
