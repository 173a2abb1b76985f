/*!
 * Guard Traits
 *
 * Common interface of the two guard variants
 */

use super::{ExpiryPolicy, GuardConfig, GuardMetadata};
use std::time::Duration;

/// Core guard trait
///
/// Implemented by [`SignalInterruptGuard`](super::SignalInterruptGuard) and
/// [`CooperativeCancelGuard`](super::CooperativeCancelGuard). The variant is
/// chosen by how the work is shaped (block/function vs task group), not by a
/// runtime flag.
///
/// Configuration is immutable; per-activation state lives in the value
/// returned by `enter`, so one guard serves many sequential activations.
pub trait TimeoutGuard: Send + Sync {
    /// Resource type name for logging/debugging
    fn resource_type(&self) -> &'static str;

    /// Get guard metadata
    fn metadata(&self) -> &GuardMetadata;

    /// Get the immutable configuration
    fn config(&self) -> &GuardConfig;

    /// Maximum wall-clock time of one activation
    fn duration(&self) -> Duration {
        self.config().duration()
    }

    /// What an expiry turns into at the call site
    fn policy(&self) -> ExpiryPolicy {
        self.config().policy()
    }
}
