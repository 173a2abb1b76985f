/*!
 * Core Module
 * Deadline guards and their limits
 */

pub mod guard;
pub mod limits;

// Re-export for convenience
pub use guard::{
    Activation, CooperativeCancelGuard, ExpiredError, ExpiryPolicy, GroupExpired, GroupReport, GuardConfig,
    GuardError, GuardResult, Outcome, Phase, Scope, SignalInterruptGuard, TaskGroup, TaskOutcome,
    TimeoutError, TimeoutGuard, TimerService,
};
