/*!
 * Guard Limits and Constants
 *
 * Centralized location for deadline-guard thresholds and defaults.
 *
 * ## Design Philosophy
 * - Values are grouped by domain (durations, polling, async groups)
 * - Performance-critical constants are marked with [PERF]
 * - Values imposed by the OS alarm are marked with [POSIX]
 */

use std::time::Duration;

// =============================================================================
// GUARD DURATIONS
// =============================================================================

/// Smallest accepted guard duration (1 millisecond)
/// Anything shorter expires before the work can reach its first checkpoint
pub const MIN_GUARD_DURATION: Duration = Duration::from_millis(1);

/// Largest accepted guard duration (365 days)
/// Keeps every `Instant + duration` deadline computation in range
pub const MAX_GUARD_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default duration for guards built from an empty config (5 seconds)
pub const DEFAULT_GUARD_DURATION: Duration = Duration::from_secs(5);

/// Resolution of the OS alarm timer (1 second)
/// [POSIX] alarm(2) only accepts whole seconds; shorter durations round up
pub const ALARM_RESOLUTION: Duration = Duration::from_secs(1);

/// Largest duration the OS alarm can hold (u32::MAX seconds)
/// [POSIX] alarm(2) takes an unsigned int
pub const MAX_ALARM_SECS: u64 = u32::MAX as u64;

// =============================================================================
// CHECKPOINT POLLING
// =============================================================================

/// Default slice for interruptible sleeps (10 milliseconds)
/// [PERF] Bounds how late an alarm-driven expiry is noticed while sleeping
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Smallest accepted poll interval (100 microseconds)
/// [PERF] Below this the sleeping thread spends most time in wakeups
pub const MIN_POLL_INTERVAL: Duration = Duration::from_micros(100);

// =============================================================================
// ASYNC TASK GROUPS
// =============================================================================

/// Initial capacity reserved for a task group's outcome list
pub const TASK_GROUP_INITIAL_CAPACITY: usize = 16;
