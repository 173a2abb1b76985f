/*!
 * Observability Tests
 * Counters and snapshots shared between guards
 */

use deadline_guard::core::guard::*;
use deadline_guard::{TimeoutStats, TimeoutStatsSnapshot};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_shared_stats_across_services() {
    let stats = Arc::new(TimeoutStats::new());
    let first = Arc::new(TimerService::with_clock().with_stats(stats.clone()));
    let second = Arc::new(TimerService::with_clock().with_stats(stats.clone()));

    let quick = SignalInterruptGuard::new(first, Duration::from_millis(200)).unwrap();
    let slow = SignalInterruptGuard::new(second, Duration::from_millis(20)).unwrap();

    assert_eq!(quick.run(|_| Ok(())).unwrap(), Some(()));
    assert_eq!(
        slow.run(|scope| {
            scope.sleep(Duration::from_secs(1))?;
            Ok(())
        })
        .unwrap(),
        None
    );

    assert_eq!(
        stats.snapshot(),
        TimeoutStatsSnapshot {
            armed: 2,
            succeeded: 1,
            timed_out: 1,
            ..Default::default()
        }
    );
}

#[test]
fn test_snapshot_serializes() {
    let stats = TimeoutStats::new();
    stats.inc_armed();
    stats.inc_timed_out();
    stats.add_tasks(0, 0, 4);

    let json = serde_json::to_value(stats.snapshot()).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "armed": 1,
            "succeeded": 0,
            "timed_out": 1,
            "abandoned": 0,
            "tasks_completed": 0,
            "tasks_failed": 0,
            "tasks_cancelled": 4,
        })
    );
}

#[test]
fn test_guard_from_json_config() {
    let config = GuardConfig::from_json(r#"{"duration_ms": 20, "policy": "propagate", "poll_interval_ms": 1}"#).unwrap();
    let guard = SignalInterruptGuard::from_config(Arc::new(TimerService::with_clock()), config);

    let result = guard.run(|scope| {
        scope.sleep(Duration::from_secs(1))?;
        Ok(())
    });

    assert!(result.unwrap_err().is_expired());
    assert_eq!(guard.config().poll_interval(), Duration::from_millis(1));
}
