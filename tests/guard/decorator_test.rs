/*!
 * Decorator Tests
 * Functions wrapped so every call runs under its own deadline
 */

use deadline_guard::core::guard::*;
use pretty_assertions::assert_eq;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

fn service() -> Arc<TimerService> {
    Arc::new(TimerService::with_clock())
}

#[derive(Debug, PartialEq)]
struct Rejected(u64);

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rejected {}", self.0)
    }
}

impl std::error::Error for Rejected {}

#[test]
fn test_foo_long_and_short_sleep() {
    let guard = SignalInterruptGuard::new(service(), Duration::from_millis(300))
        .unwrap()
        .with_label("foo");
    let foo = guard.decorate(|scope, millis: u64| {
        scope.sleep(Duration::from_millis(millis))?;
        Ok("Ok!")
    });

    assert_eq!(foo(600).unwrap(), None);
    assert_eq!(foo(100).unwrap(), Some("Ok!"));
    assert!(!guard.service().is_held());
}

#[test]
fn test_repeated_calls_are_independent() {
    let guard = SignalInterruptGuard::new(service(), Duration::from_millis(100)).unwrap();
    let square = guard.decorate(|scope, n: u64| {
        scope.checkpoint()?;
        Ok(n * n)
    });

    let results: Vec<_> = (1..=5).map(|n| square(n).unwrap()).collect();
    assert_eq!(results, vec![Some(1), Some(4), Some(9), Some(16), Some(25)]);

    let stats = guard.service().stats().snapshot();
    assert_eq!(stats.armed, 5);
    assert_eq!(stats.succeeded, 5);
    assert_eq!(stats.in_flight(), 0);
}

#[test]
fn test_tuple_arguments() {
    let guard = SignalInterruptGuard::new(service(), Duration::from_millis(100)).unwrap();
    let add = guard.decorate(|scope, (a, b): (i32, i32)| {
        scope.checkpoint()?;
        Ok(a + b)
    });

    assert_eq!(add((2, 40)).unwrap(), Some(42));
}

#[test]
fn test_propagate_reports_expiry() {
    let guard =
        SignalInterruptGuard::with_policy(service(), Duration::from_millis(50), ExpiryPolicy::Propagate).unwrap();
    let slow = guard.decorate(|scope, millis: u64| {
        scope.sleep(Duration::from_millis(millis))?;
        Ok(millis)
    });

    let err = slow(1_000).unwrap_err();
    assert!(err.is_expired());
    assert_eq!(err.expired().map(ExpiredError::duration), Some(Duration::from_millis(50)));

    // The guard is reusable after an expiry
    assert_eq!(slow(1).unwrap(), Some(1));
}

#[test]
fn test_try_decorate_keeps_operation_errors() {
    let guard = SignalInterruptGuard::new(service(), Duration::from_millis(100)).unwrap();
    let checked = guard.try_decorate(|scope, n: u64| -> Result<u64, TimeoutError<Rejected>> {
        scope.checkpoint()?;
        if n % 2 == 0 {
            Ok(n / 2)
        } else {
            Err(TimeoutError::Operation(Rejected(n)))
        }
    });

    assert_eq!(checked(8).unwrap(), Some(4));
    match checked(3) {
        Err(TimeoutError::Operation(e)) => {
            assert_eq!(e, Rejected(3));
            assert_eq!(TimeoutError::Operation(e).to_string(), "Operation failed: rejected 3");
        }
        other => panic!("Expected operation error, got {:?}", other),
    }
    assert!(!guard.service().is_held());
}

#[test]
fn test_decorated_functions_share_service() {
    let service = service();
    let first = SignalInterruptGuard::new(service.clone(), Duration::from_millis(100)).unwrap();
    let second = SignalInterruptGuard::new(service.clone(), Duration::from_millis(100)).unwrap();

    let inc = first.decorate(|_, n: u32| Ok(n + 1));
    let dec = second.decorate(|_, n: u32| Ok(n - 1));

    assert_eq!(inc(1).unwrap(), Some(2));
    assert_eq!(dec(1).unwrap(), Some(0));
    assert_eq!(service.stats().snapshot().armed, 2);
}

#[test]
fn test_label_in_metadata() {
    let guard = SignalInterruptGuard::new(service(), Duration::from_millis(100))
        .unwrap()
        .with_label("fetch_report");

    assert_eq!(guard.resource_type(), "signal_interrupt");
    assert_eq!(guard.metadata().label.as_deref(), Some("fetch_report"));
    assert_eq!(guard.duration(), Duration::from_millis(100));
    assert_eq!(guard.policy(), ExpiryPolicy::Suppress);
}
