/*!
 * Activation Observability
 *
 * Tracing span + counters for the activation lifecycle: armed, then one of
 * succeeded, timed out or abandoned (dropped while armed)
 */

use super::timer::ActivationId;
use crate::monitoring::TimeoutStats;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, span, warn, Level, Span};
use uuid::Uuid;

/// Span covering one guard activation
///
/// Emits the "armed" observation on creation; the caller reports exactly one
/// of [`succeeded`](Self::succeeded) or [`timed_out`](Self::timed_out).
pub struct ActivationSpan {
    span: Span,
    start: Instant,
    trace_id: String,
    guard: &'static str,
    duration: Duration,
    stats: Arc<TimeoutStats>,
}

impl ActivationSpan {
    pub fn armed(
        guard: &'static str,
        label: Option<&str>,
        activation: Option<ActivationId>,
        duration: Duration,
        stats: Arc<TimeoutStats>,
    ) -> Self {
        let trace_id = Uuid::new_v4().to_string();

        let span = span!(
            Level::DEBUG,
            "activation",
            trace_id = %trace_id,
            guard = guard,
            label = label.unwrap_or(""),
            activation = tracing::field::Empty,
            duration_ms = duration.as_millis() as u64,
            outcome = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        );
        if let Some(id) = activation {
            span.record("activation", id.raw());
        }

        stats.inc_armed();
        span.in_scope(|| {
            debug!(
                guard = guard,
                duration_ms = duration.as_millis() as u64,
                "Guard armed"
            );
        });

        Self {
            span,
            start: Instant::now(),
            trace_id,
            guard,
            duration,
            stats,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Work finished before the deadline
    pub fn succeeded(&self) {
        let elapsed = self.elapsed();
        self.record_outcome("succeeded", elapsed);
        self.stats.inc_succeeded();

        let _entered = self.span.enter();
        debug!(
            guard = self.guard,
            elapsed_ms = elapsed.as_millis() as u64,
            "Guard disarmed before deadline"
        );
    }

    /// Deadline elapsed before the work finished
    pub fn timed_out(&self) {
        let elapsed = self.elapsed();
        self.record_outcome("timed_out", elapsed);
        self.stats.inc_timed_out();

        let _entered = self.span.enter();
        warn!(
            guard = self.guard,
            elapsed_ms = elapsed.as_millis() as u64,
            timeout_ms = self.duration.as_millis() as u64,
            "Guard timed out"
        );
    }

    /// Activation dropped while still armed
    pub fn abandoned(&self) {
        let elapsed = self.elapsed();
        self.record_outcome("abandoned", elapsed);
        self.stats.inc_abandoned();

        let _entered = self.span.enter();
        debug!(
            guard = self.guard,
            elapsed_ms = elapsed.as_millis() as u64,
            "Guard abandoned while armed"
        );
    }

    /// Per-task tally of an async group
    pub fn tasks_settled(&self, completed: usize, failed: usize, cancelled: usize) {
        self.stats.add_tasks(completed as u64, failed as u64, cancelled as u64);

        let _entered = self.span.enter();
        debug!(completed, failed, cancelled, "Task group settled");
    }

    fn record_outcome(&self, outcome: &'static str, elapsed: Duration) {
        self.span.record("outcome", outcome);
        self.span.record("elapsed_ms", elapsed.as_millis() as u64);
    }
}

impl std::fmt::Debug for ActivationSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationSpan")
            .field("trace_id", &self.trace_id)
            .field("guard", &self.guard)
            .field("duration", &self.duration)
            .finish()
    }
}
