/*!
 * Async Task Group Tests
 * Cooperative-cancel guard over groups of tokio tasks
 */

use deadline_guard::core::guard::*;
use deadline_guard::TimeoutStats;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

#[tokio::test(start_paused = true)]
async fn test_all_slow_tasks_cancelled() {
    let guard = CooperativeCancelGuard::new(Duration::from_secs(1)).unwrap();
    let finished = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let report = guard
        .run_group((0..8).map(|_| {
            let finished = finished.clone();
            async move {
                sleep(Duration::from_secs(2)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .await
        .unwrap();

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
    assert!(report.expired());
    assert_eq!(report.len(), 8);
    assert_eq!(report.cancelled(), 8);
    assert_eq!(report.completed(), 0);

    // Aborted tasks never resume past their suspension point
    sleep(Duration::from_secs(5)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 0);
}

async fn fail_after(delay: Duration) -> &'static str {
    sleep(delay).await;
    panic!("lookup failed")
}

#[tokio::test(start_paused = true)]
async fn test_mixed_outcomes() {
    let guard = CooperativeCancelGuard::new(Duration::from_secs(1)).unwrap();
    let mut group = guard.enter::<&'static str>();

    group.spawn(async {
        sleep(Duration::from_millis(100)).await;
        "quick"
    });
    group.spawn(fail_after(Duration::from_millis(200)));
    group.spawn(async {
        sleep(Duration::from_secs(3)).await;
        "slow"
    });
    assert_eq!(group.len(), 3);

    let report = group.exit().await.unwrap();
    assert!(report.expired());

    let outcomes: Vec<_> = report.outcomes().iter().map(|task| task.outcome.clone()).collect();
    assert_eq!(
        outcomes,
        vec![
            Outcome::Completed("quick"),
            Outcome::Failed("lookup failed".to_string()),
            Outcome::Cancelled,
        ]
    );
    assert_eq!(report.values().copied().collect::<Vec<_>>(), vec!["quick"]);
}

#[tokio::test(start_paused = true)]
async fn test_outcomes_follow_spawn_order() {
    let guard = CooperativeCancelGuard::new(Duration::from_secs(1)).unwrap();
    let mut group = guard.enter();

    // Later tasks finish first
    for n in 0..4u64 {
        let id = group.spawn(async move {
            sleep(Duration::from_millis(400 - n * 100)).await;
            n
        });
        assert_eq!(id, n as usize);
    }

    let report = group.exit().await.unwrap();
    assert!(!report.expired());
    let ids: Vec<_> = report.outcomes().iter().map(|task| task.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert_eq!(report.values().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_propagate_keeps_report() {
    let guard = CooperativeCancelGuard::with_policy(Duration::from_secs(1), ExpiryPolicy::Propagate).unwrap();
    let mut group = guard.enter();
    group.spawn(async { 1u32 });
    group.spawn(async {
        sleep(Duration::from_secs(10)).await;
        2u32
    });

    let expired = group.exit().await.unwrap_err();
    assert_eq!(expired.error.duration(), Duration::from_secs(1));
    assert_eq!(expired.report.completed(), 1);
    assert_eq!(expired.report.cancelled(), 1);
    assert_eq!(expired.to_string(), "deadline of 1000ms expired: 1 of 2 tasks cancelled");
}

#[tokio::test(start_paused = true)]
async fn test_propagate_without_expiry_is_ok() {
    let guard = CooperativeCancelGuard::with_policy(Duration::from_secs(1), ExpiryPolicy::Propagate).unwrap();

    let report = guard
        .run_group((0..3u32).map(|n| async move {
            sleep(Duration::from_millis(10)).await;
            n * 10
        }))
        .await
        .unwrap();

    assert!(!report.expired());
    assert_eq!(report.values().sum::<u32>(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_group_aborts_tasks() {
    let guard = CooperativeCancelGuard::new(Duration::from_secs(5)).unwrap();
    let finished = Arc::new(AtomicUsize::new(0));

    {
        let mut group = guard.enter();
        let counter = finished.clone();
        group.spawn(async move {
            sleep(Duration::from_secs(1)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(group.phase(), Phase::Armed);
    }

    sleep(Duration::from_secs(2)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 0);

    let stats = guard.stats().snapshot();
    assert_eq!(stats.abandoned, 1);
    assert_eq!(stats.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_group_stats() {
    let stats = Arc::new(TimeoutStats::new());
    let guard = CooperativeCancelGuard::new(Duration::from_secs(1))
        .unwrap()
        .with_label("crawl")
        .with_stats(stats.clone());

    let mut group = guard.enter();
    group.spawn(async { 1u8 });
    group.spawn(async {
        sleep(Duration::from_secs(2)).await;
        2u8
    });
    group.exit().await.unwrap();

    guard.run_group(vec![async { 3u8 }]).await.unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.armed, 2);
    assert_eq!(snapshot.timed_out, 1);
    assert_eq!(snapshot.succeeded, 1);
    assert_eq!(snapshot.tasks_completed, 2);
    assert_eq!(snapshot.tasks_cancelled, 1);
    assert_eq!(snapshot.timeout_ratio(), 0.5);
}

#[tokio::test(start_paused = true)]
async fn test_remaining_counts_down() {
    let guard = CooperativeCancelGuard::new(Duration::from_secs(1)).unwrap();
    let group = guard.enter::<()>();

    assert_eq!(group.remaining(), Duration::from_secs(1));
    sleep(Duration::from_millis(400)).await;
    assert_eq!(group.remaining(), Duration::from_millis(600));
}

struct PanicOnDrop;

impl Drop for PanicOnDrop {
    fn drop(&mut self) {
        panic!("cleanup failed")
    }
}

#[tokio::test(start_paused = true)]
async fn test_panic_while_aborting_is_failed() {
    let guard = CooperativeCancelGuard::new(Duration::from_secs(1)).unwrap();
    let mut group = guard.enter::<u32>();

    group.spawn(async {
        let _cleanup = PanicOnDrop;
        sleep(Duration::from_secs(5)).await;
        1
    });
    group.spawn(async {
        sleep(Duration::from_secs(5)).await;
        2
    });

    let report = group.exit().await.unwrap();
    assert!(report.expired());
    assert_eq!(report.outcomes()[0].outcome, Outcome::Failed("cleanup failed".to_string()));
    assert_eq!(report.outcomes()[1].outcome, Outcome::Cancelled);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.cancelled(), 1);
}
