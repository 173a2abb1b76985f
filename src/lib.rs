/*!
 * Deadline Guard Library
 * Bounded execution for blocks, functions and async task groups
 */

pub mod core;
pub mod monitoring;

// Re-exports
pub use crate::core::guard::{
    Activation, ActivationId, CooperativeCancelGuard, DeadlineClock, ExpiredError, ExpiryPolicy, ExpirySource,
    GroupExpired, GroupReport, GuardConfig, GuardError, GuardResult, Outcome, Phase, Scope, SignalInterruptGuard,
    TaskGroup, TaskOutcome, TimeoutError, TimeoutGuard, TimerService,
};
#[cfg(unix)]
pub use crate::core::guard::AlarmSignal;
pub use monitoring::{init_tracing, TimeoutStats, TimeoutStatsSnapshot};
