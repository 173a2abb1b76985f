/*!
 * Deadline Guard - Demo Entry Point
 *
 * Re-enacts the decorated `foo(n)` self-test:
 * - `foo(2 * secs)` outlives the guard and yields nothing
 * - `foo(secs - 1)` finishes and yields "Ok!"
 *
 * then bounds a group of async tasks that all outlive their deadline.
 *
 * Environment variables:
 * - DEADLINE_DEMO_SECS: guard duration in seconds (default: 5)
 * - DEADLINE_DEMO_SOURCE: "clock" or "alarm" (default: clock)
 * - RUST_LOG / DEADLINE_TRACE_JSON: see `init_tracing`
 */

use anyhow::{bail, Context, Result};
use deadline_guard::{init_tracing, CooperativeCancelGuard, SignalInterruptGuard, TimerService};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn main() -> Result<()> {
    init_tracing();

    let secs: u64 = std::env::var("DEADLINE_DEMO_SECS")
        .ok()
        .map(|v| v.parse())
        .transpose()
        .context("DEADLINE_DEMO_SECS must be a whole number of seconds")?
        .unwrap_or(5);
    if secs == 0 {
        bail!("DEADLINE_DEMO_SECS must be at least 1");
    }

    let service = Arc::new(timer_service()?);
    info!(source = service.source_name(), duration_secs = secs, "Deadline guard demo starting");

    let guard = SignalInterruptGuard::new(service.clone(), Duration::from_secs(secs))?.with_label("foo");
    let foo = guard.decorate(|scope, n: u64| {
        scope.sleep(Duration::from_secs(n))?;
        Ok("Ok!")
    });

    for n in [secs * 2, secs - 1] {
        let result = foo(n)?;
        info!(n, result = ?result, "foo returned");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to build tokio runtime")?;

    let group_guard = CooperativeCancelGuard::new(Duration::from_secs(1))?
        .with_label("sleepers")
        .with_stats(service.stats().clone());
    let report = runtime.block_on(group_guard.run_group((0..4u64).map(|n| async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        n
    })))?;

    info!(
        expired = report.expired(),
        completed = report.completed(),
        cancelled = report.cancelled(),
        "Task group settled"
    );
    for task in report.into_outcomes() {
        info!(task = task.id, outcome = ?task.outcome, "Task outcome");
    }

    let stats = service.stats().snapshot();
    info!(
        armed = stats.armed,
        succeeded = stats.succeeded,
        timed_out = stats.timed_out,
        in_flight = stats.in_flight(),
        "Demo finished"
    );

    Ok(())
}

fn timer_service() -> Result<TimerService> {
    let source = std::env::var("DEADLINE_DEMO_SOURCE").unwrap_or_else(|_| "clock".to_string());
    match source.as_str() {
        "clock" => Ok(TimerService::with_clock()),
        #[cfg(unix)]
        "alarm" => Ok(TimerService::with_alarm()?),
        other => bail!("Unsupported expiry source: {}", other),
    }
}
