/*!
 * Cooperative-Cancel Guard
 *
 * Deadline for a group of async tasks with automatic cancellation.
 *
 * The expiry is delivered to the scheduler rather than to a call stack: when
 * the deadline elapses, every unfinished task in the group is aborted and
 * stops at its next `.await`. The caller gets one outcome per task, so slow
 * but completed tasks and cancelled tasks are both visible.
 *
 * A task whose result was already available when the deadline fired keeps its
 * own outcome (`Completed` or `Failed`); only tasks actually stopped by the
 * abort are reported as `Cancelled`.
 */

use super::observe::ActivationSpan;
use super::phase::{Phase, PhaseCell};
use super::traits::TimeoutGuard;
use super::{ExpiredError, ExpiryPolicy, GuardConfig, GuardMetadata, GuardResult};
use crate::core::limits::TASK_GROUP_INITIAL_CAPACITY;
use crate::monitoring::TimeoutStats;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tracing::debug;

const RESOURCE_TYPE: &str = "cooperative_cancel";

/// Guard for groups of async tasks
///
/// # Example
///
/// ```ignore
/// let guard = CooperativeCancelGuard::new(Duration::from_secs(1))?;
///
/// let mut group = guard.enter();
/// for n in 0..4 {
///     group.spawn(async move { fetch(n).await });
/// }
/// let report = group.exit().await?;
/// ```
#[derive(Debug, Clone)]
pub struct CooperativeCancelGuard {
    config: GuardConfig,
    metadata: GuardMetadata,
    stats: Arc<TimeoutStats>,
}

impl CooperativeCancelGuard {
    /// Create a suppressing guard
    pub fn new(duration: Duration) -> GuardResult<Self> {
        Ok(Self::from_config(GuardConfig::new(duration)?))
    }

    /// Create a guard with an explicit policy
    pub fn with_policy(duration: Duration, policy: ExpiryPolicy) -> GuardResult<Self> {
        Ok(Self::from_config(GuardConfig::new(duration)?.with_policy(policy)))
    }

    pub fn from_config(config: GuardConfig) -> Self {
        Self {
            config,
            metadata: GuardMetadata::new(RESOURCE_TYPE),
            stats: Arc::new(TimeoutStats::new()),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.metadata = self.metadata.with_label(label);
        self
    }

    /// Share a stats sink with other guards
    pub fn with_stats(mut self, stats: Arc<TimeoutStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> &Arc<TimeoutStats> {
        &self.stats
    }

    /// Arm the deadline and open an empty task group
    ///
    /// Tasks are spawned on the current tokio runtime, so `spawn` and `exit`
    /// must be called from within one.
    pub fn enter<T: Send + 'static>(&self) -> TaskGroup<T> {
        let span = ActivationSpan::armed(
            RESOURCE_TYPE,
            self.metadata.label.as_deref(),
            None,
            self.config.duration(),
            self.stats.clone(),
        );

        let phase = PhaseCell::new();
        phase.arm();

        TaskGroup {
            set: JoinSet::new(),
            tasks: HashMap::new(),
            spawned: 0,
            deadline: Instant::now() + self.config.duration(),
            phase,
            config: self.config,
            span,
        }
    }

    /// Spawn every task in one group and wait for the group to settle
    pub async fn run_group<T, I, F>(&self, tasks: I) -> Result<GroupReport<T>, GroupExpired<T>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let mut group = self.enter();
        for task in tasks {
            group.spawn(task);
        }
        group.exit().await
    }
}

impl TimeoutGuard for CooperativeCancelGuard {
    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn metadata(&self) -> &GuardMetadata {
        &self.metadata
    }

    fn config(&self) -> &GuardConfig {
        &self.config
    }
}

/// Final state of one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// Finished with a value
    Completed(T),

    /// Panicked; carries the panic message
    Failed(String),

    /// Stopped by the deadline before finishing
    Cancelled,
}

impl<T> Outcome<T> {
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Outcome of the task spawned `id`-th in its group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome<T> {
    pub id: usize,
    pub outcome: Outcome<T>,
}

/// Per-task outcomes of one group activation, ordered by spawn order
#[derive(Debug, Clone)]
pub struct GroupReport<T> {
    outcomes: Vec<TaskOutcome<T>>,
    expired: bool,
    elapsed: Duration,
}

impl<T> GroupReport<T> {
    pub fn outcomes(&self) -> &[TaskOutcome<T>] {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> Vec<TaskOutcome<T>> {
        self.outcomes
    }

    /// Whether the deadline fired
    #[inline]
    pub fn expired(&self) -> bool {
        self.expired
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn completed(&self) -> usize {
        self.count(Outcome::is_completed)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::is_failed)
    }

    pub fn cancelled(&self) -> usize {
        self.count(Outcome::is_cancelled)
    }

    /// Values of completed tasks, in spawn order
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.outcomes.iter().filter_map(|task| match &task.outcome {
            Outcome::Completed(value) => Some(value),
            _ => None,
        })
    }

    fn count(&self, predicate: fn(&Outcome<T>) -> bool) -> usize {
        self.outcomes.iter().filter(|task| predicate(&task.outcome)).count()
    }
}

/// Group deadline fired under `Propagate`
///
/// The report is kept so completed work is not lost.
#[derive(Debug, thiserror::Error)]
#[error("{error}: {} of {} tasks cancelled", .report.cancelled(), .report.len())]
pub struct GroupExpired<T> {
    pub error: ExpiredError,
    pub report: GroupReport<T>,
}

type TaskResult<T> = (usize, Result<T, String>);

/// Tasks sharing one deadline
///
/// Dropping the group without `exit` aborts every task still running.
pub struct TaskGroup<T> {
    set: JoinSet<TaskResult<T>>,
    tasks: HashMap<Id, usize>,
    spawned: usize,
    deadline: Instant,
    phase: PhaseCell,
    config: GuardConfig,
    span: ActivationSpan,
}

impl<T: Send + 'static> TaskGroup<T> {
    /// Schedule a task; returns its id within the group
    pub fn spawn<F>(&mut self, task: F) -> usize
    where
        F: Future<Output = T> + Send + 'static,
    {
        let id = self.spawned;
        self.spawned += 1;

        let handle = self.set.spawn(async move {
            let result = AssertUnwindSafe(task).catch_unwind().await.map_err(panic_message);
            (id, result)
        });
        self.tasks.insert(handle.id(), id);
        id
    }

    /// Number of tasks spawned so far
    pub fn len(&self) -> usize {
        self.spawned
    }

    pub fn is_empty(&self) -> bool {
        self.spawned == 0
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Wait for every task or the deadline, whichever comes first
    ///
    /// On deadline the unfinished tasks are aborted and then joined, so the
    /// report always holds exactly one outcome per spawned task.
    pub async fn exit(mut self) -> Result<GroupReport<T>, GroupExpired<T>> {
        let mut slots: Vec<Option<Outcome<T>>> = Vec::with_capacity(self.spawned.max(TASK_GROUP_INITIAL_CAPACITY));
        slots.resize_with(self.spawned, || None);

        let sleep = tokio::time::sleep_until(self.deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                joined = self.set.join_next() => match joined {
                    Some(joined) => record(&mut slots, &self.tasks, joined),
                    None => break,
                },
                _ = &mut sleep => {
                    if self.phase.fire() {
                        self.span.timed_out();
                    }
                    self.set.abort_all();
                    break;
                }
            }
        }

        while let Some(joined) = self.set.join_next().await {
            record(&mut slots, &self.tasks, joined);
        }

        if self.phase.disarm() {
            self.span.succeeded();
        }

        let outcomes: Vec<TaskOutcome<T>> = slots
            .into_iter()
            .enumerate()
            .map(|(id, slot)| TaskOutcome {
                id,
                outcome: slot.unwrap_or(Outcome::Cancelled),
            })
            .collect();

        let report = GroupReport {
            outcomes,
            expired: self.phase.get() == Phase::Fired,
            elapsed: self.span.elapsed(),
        };
        self.span
            .tasks_settled(report.completed(), report.failed(), report.cancelled());

        match (report.expired, self.config.policy()) {
            (true, ExpiryPolicy::Propagate) => Err(GroupExpired {
                error: ExpiredError::new(self.config.duration()),
                report,
            }),
            _ => Ok(report),
        }
    }
}

impl<T> Drop for TaskGroup<T> {
    fn drop(&mut self) {
        if self.phase.disarm() {
            debug!(tasks = self.spawned, "Task group dropped while armed; aborting tasks");
            self.span.abandoned();
        }
    }
}

impl<T> std::fmt::Debug for TaskGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("spawned", &self.spawned)
            .field("deadline", &self.deadline)
            .field("phase", &self.phase.get())
            .finish()
    }
}

fn record<T>(
    slots: &mut [Option<Outcome<T>>],
    tasks: &HashMap<Id, usize>,
    joined: Result<TaskResult<T>, JoinError>,
) {
    match joined {
        Ok((id, Ok(value))) => slots[id] = Some(Outcome::Completed(value)),
        Ok((id, Err(message))) => slots[id] = Some(Outcome::Failed(message)),
        // Panicked outside the task body, e.g. while being dropped on abort
        Err(e) if e.is_panic() => {
            if let Some(&id) = tasks.get(&e.id()) {
                slots[id] = Some(Outcome::Failed(panic_message(e.into_panic())));
            }
        }
        // Aborted tasks leave their slot empty, which reads as Cancelled
        Err(_) => {}
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
