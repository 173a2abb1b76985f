/*!
 * Guard Configuration
 *
 * Immutable duration + policy pair shared by every activation of a guard.
 *
 * ## Example
 *
 * ```ignore
 * let config = GuardConfig::new(Duration::from_secs(5))?.propagate();
 *
 * // Or from JSON
 * let config = GuardConfig::from_json(r#"{"duration_ms": 5000, "policy": "propagate"}"#)?;
 * ```
 */

use super::{GuardError, GuardResult};
use crate::core::limits::{
    DEFAULT_GUARD_DURATION, DEFAULT_POLL_INTERVAL, MAX_GUARD_DURATION, MIN_GUARD_DURATION, MIN_POLL_INTERVAL,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::time::Duration;

/// What happens to an expiry once the work has been interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryPolicy {
    /// Absorb the expiry; the call yields `None`
    ///
    /// A timed-out call is indistinguishable from one that produced no value.
    #[default]
    Suppress,

    /// Return the expiry to the caller as `Err`
    Propagate,
}

impl ExpiryPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Suppress => "suppress",
            Self::Propagate => "propagate",
        }
    }

    #[inline]
    pub fn propagates(&self) -> bool {
        matches!(self, Self::Propagate)
    }
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

/// Guard configuration
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "duration_ms")]
    duration: Duration,

    #[serde(default)]
    policy: ExpiryPolicy,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "poll_interval_ms", default = "default_poll_interval")]
    poll_interval: Duration,
}

impl GuardConfig {
    /// Create config with the default (suppressing) policy
    pub fn new(duration: Duration) -> GuardResult<Self> {
        let config = Self {
            duration,
            policy: ExpiryPolicy::Suppress,
            poll_interval: DEFAULT_POLL_INTERVAL,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> GuardResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| GuardError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the expiry policy
    pub fn with_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shorthand for `with_policy(ExpiryPolicy::Propagate)`
    pub fn propagate(self) -> Self {
        self.with_policy(ExpiryPolicy::Propagate)
    }

    /// Shorthand for `with_policy(ExpiryPolicy::Suppress)`
    pub fn suppress(self) -> Self {
        self.with_policy(ExpiryPolicy::Suppress)
    }

    /// Set the slice length of interruptible sleeps
    ///
    /// Values below `MIN_POLL_INTERVAL` are clamped.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[inline]
    pub fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    #[inline]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn validate(&self) -> GuardResult<()> {
        if self.duration < MIN_GUARD_DURATION || self.duration > MAX_GUARD_DURATION {
            return Err(GuardError::InvalidDuration(self.duration));
        }
        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(GuardError::InvalidConfig(format!(
                "poll interval {:?} below minimum {:?}",
                self.poll_interval, MIN_POLL_INTERVAL
            )));
        }
        Ok(())
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_GUARD_DURATION,
            policy: ExpiryPolicy::Suppress,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
