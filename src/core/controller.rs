//! The admission loop.
//!
//! One task owns every lane, the lease table, and the retry coordinator.
//! Handles and running attempts talk to it over a command channel; the loop
//! ticks on a fixed interval and again right after any command that can free
//! capacity or add work.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{UnboundedReceiver, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::QueueConfig;
use crate::core::audit::{build_audit_event, AuditAction, AuditSink};
use crate::core::dead_letter::DeadLetterEntry;
use crate::core::error::QueueError;
use crate::core::executor::{Outcome, Settle, Spawn};
use crate::core::lane::{LaneEntry, LaneSet};
use crate::core::lease::LeaseTracker;
use crate::core::operation::Operation;
use crate::core::retry::{FailureKind, Resolution, RetryCoordinator};
use crate::core::sampler::ResourceSampler;
use crate::core::stats::{QueueLimits, QueueStats};
use crate::core::throttle::Throttle;
use crate::util::serde::{OperationId, Priority};

/// Requests handled by the admission loop.
pub(crate) enum Command {
    Submit(Operation),
    Finished {
        id: OperationId,
        attempt: u64,
        outcome: Outcome<Settle>,
    },
    RetryDue(Operation),
    Heartbeat {
        id: OperationId,
        reply: oneshot::Sender<bool>,
    },
    Stats(oneshot::Sender<QueueStats>),
    DeadLetters(oneshot::Sender<Vec<DeadLetterEntry>>),
    RemoveDeadLetter {
        id: OperationId,
        reply: oneshot::Sender<bool>,
    },
    ClearDeadLetters(oneshot::Sender<usize>),
    ReplayDeadLetter {
        id: OperationId,
        reply: oneshot::Sender<bool>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Level an operation competes at after waiting `waited` in its lane: one
/// level higher per full `aging_threshold`, saturating at `Critical`.
#[must_use]
pub fn effective_level(priority: Priority, waited: Duration, aging_threshold: Duration) -> usize {
    if aging_threshold.is_zero() {
        return priority.level();
    }
    let steps = waited.as_nanos() / aging_threshold.as_nanos();
    priority.promoted_level(usize::try_from(steps).unwrap_or(usize::MAX))
}

/// Lane whose head should be admitted next.
///
/// Heads compete on effective level, then on lane-entry time. Lanes are
/// scanned from `Critical` down and only a strictly better head replaces the
/// current pick.
pub fn select_lane<T: LaneEntry>(
    lanes: &LaneSet<T>,
    now: Instant,
    aging_threshold: Duration,
) -> Option<Priority> {
    let mut best: Option<(usize, Instant, Priority)> = None;
    for lane in lanes.iter() {
        let Some(head) = lane.peek_head() else {
            continue;
        };
        let entered = head.entered_at();
        let level = effective_level(
            lane.priority(),
            now.saturating_duration_since(entered),
            aging_threshold,
        );
        if best.is_none_or(|(l, at, _)| (level, entered) < (l, at)) {
            best = Some((level, entered, lane.priority()));
        }
    }
    best.map(|(_, _, priority)| priority)
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Serial scheduler owning all queue state.
pub(crate) struct AdmissionController {
    config: Arc<QueueConfig>,
    lanes: LaneSet<Operation>,
    leases: LeaseTracker,
    retries: RetryCoordinator,
    sampler: Arc<ResourceSampler>,
    throttle: Arc<Throttle>,
    spawner: Arc<dyn Spawn>,
    audit: Option<Arc<dyn AuditSink>>,
    commands: WeakUnboundedSender<Command>,
    /// Cancel switches for operations waiting out a retry backoff.
    parked: HashMap<OperationId, oneshot::Sender<()>>,
    total_admitted: u64,
    total_completed: u64,
    total_wait: Duration,
    throttled_ticks: u64,
    backlog_warning: bool,
}

impl AdmissionController {
    pub(crate) fn new(
        config: Arc<QueueConfig>,
        sampler: Arc<ResourceSampler>,
        throttle: Arc<Throttle>,
        spawner: Arc<dyn Spawn>,
        audit: Option<Arc<dyn AuditSink>>,
        commands: WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            lanes: LaneSet::new(),
            leases: LeaseTracker::new(config.lease_timeout()),
            retries: RetryCoordinator::new(&config),
            config,
            sampler,
            throttle,
            spawner,
            audit,
            commands,
            parked: HashMap::new(),
            total_admitted: 0,
            total_completed: 0,
            total_wait: Duration::ZERO,
            throttled_ticks: 0,
            backlog_warning: false,
        }
    }

    /// Run until shutdown or until every handle is dropped.
    pub(crate) async fn run(mut self, mut rx: UnboundedReceiver<Command>) {
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            tick_ms = self.config.tick_interval_ms,
            max_cpu_percent = self.config.max_cpu_percent,
            max_ram_percent = self.config.max_ram_percent,
            "admission loop started"
        );

        loop {
            tokio::select! {
                biased;
                cmd = rx.recv() => match cmd {
                    Some(Command::Shutdown(reply)) => {
                        self.shutdown();
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => {
                        if self.handle(cmd) {
                            self.tick();
                        }
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                _ = ticker.tick() => self.tick(),
            }
        }
    }

    /// Apply one command. Returns whether a tick should follow.
    fn handle(&mut self, cmd: Command) -> bool {
        let now = Instant::now();
        match cmd {
            Command::Submit(operation) => {
                tracing::debug!(
                    id = %operation.id(),
                    priority = %operation.priority(),
                    name = operation.name().unwrap_or_default(),
                    "operation enqueued"
                );
                self.record(operation.id(), operation.priority(), AuditAction::Enqueue, None);
                self.push(operation, now);
                true
            }
            Command::Finished {
                id,
                attempt,
                outcome,
            } => {
                self.on_finished(id, attempt, outcome, now);
                true
            }
            Command::RetryDue(operation) => {
                self.parked.remove(&operation.id());
                self.push(operation, now);
                true
            }
            Command::Heartbeat { id, reply } => {
                let _ = reply.send(self.leases.heartbeat(&id, now));
                true
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
                false
            }
            Command::DeadLetters(reply) => {
                let _ = reply.send(self.retries.dead_letters().list(now));
                false
            }
            Command::RemoveDeadLetter { id, reply } => {
                let _ = reply.send(self.retries.dead_letters().remove(&id));
                false
            }
            Command::ClearDeadLetters(reply) => {
                let cleared = self.retries.dead_letters().clear();
                tracing::info!(cleared, "dead letters cleared");
                let _ = reply.send(cleared);
                false
            }
            Command::ReplayDeadLetter { id, reply } => {
                let replayed = self.replay(&id, now);
                let _ = reply.send(replayed);
                replayed
            }
            Command::Shutdown(reply) => {
                self.shutdown();
                let _ = reply.send(());
                false
            }
        }
    }

    fn tick(&mut self) {
        let now = Instant::now();
        self.sweep_leases(now);
        let pruned = self.retries.dead_letters().prune(now);
        if pruned > 0 {
            tracing::debug!(pruned, "dead letters expired");
        }
        self.admit(now);
    }

    fn sweep_leases(&mut self, now: Instant) {
        for operation in self.leases.take_expired(now) {
            tracing::warn!(
                id = %operation.id(),
                priority = %operation.priority(),
                lease_ms = millis(self.leases.timeout()),
                "lease expired without a result"
            );
            self.record(
                operation.id(),
                operation.priority(),
                AuditAction::LeaseExpired,
                None,
            );
            let error = anyhow::anyhow!(
                "lease expired after {}ms",
                millis(self.leases.timeout())
            );
            self.resolve_failure(operation, FailureKind::LeaseExpired, error, now);
        }
    }

    fn admit(&mut self, now: Instant) {
        while !self.lanes.is_empty() {
            if let Some(cap) = self.config.max_in_flight {
                if self.leases.len() >= cap {
                    break;
                }
            }
            let snapshot = self.sampler.sample();
            if snapshot.exceeds(self.config.max_cpu_percent, self.config.max_ram_percent) {
                self.throttled_ticks += 1;
                tracing::debug!(
                    cpu_percent = snapshot.cpu_percent,
                    ram_percent = snapshot.ram_percent,
                    waiting = self.lanes.total_len(),
                    "admission paused by resource limits"
                );
                break;
            }
            let Some(priority) = select_lane(&self.lanes, now, self.config.aging_threshold())
            else {
                break;
            };
            let Some(operation) = self.lanes.lane_mut(priority).pop_head() else {
                break;
            };
            self.update_backlog();
            self.launch(operation, now);
        }
    }

    fn launch(&mut self, operation: Operation, now: Instant) {
        let wait = now.saturating_duration_since(operation.lane_entered_at());
        self.total_wait += wait;
        self.total_admitted += 1;

        let id = operation.id();
        let priority = operation.priority();
        let job = Arc::clone(&operation.job);
        tracing::debug!(
            %id,
            %priority,
            retry = operation.retry_count(),
            wait_ms = millis(wait),
            "operation admitted"
        );
        self.record(id, priority, AuditAction::Admit, None);
        let attempt = self.leases.grant(operation, now);

        let Some(tx) = self.commands.upgrade() else {
            return;
        };
        self.spawner.spawn(Box::pin(async move {
            let outcome = job.attempt().await;
            let _ = tx.send(Command::Finished {
                id,
                attempt,
                outcome,
            });
        }));
    }

    fn on_finished(&mut self, id: OperationId, attempt: u64, outcome: Outcome<Settle>, now: Instant) {
        let Some(operation) = self.leases.release(&id, attempt) else {
            tracing::debug!(%id, attempt, "ignoring result of superseded attempt");
            return;
        };
        match outcome {
            Outcome::Success(settle) => {
                settle();
                self.total_completed += 1;
                tracing::debug!(
                    %id,
                    priority = %operation.priority(),
                    retries = operation.retry_count(),
                    "operation completed"
                );
                self.record(id, operation.priority(), AuditAction::Complete, None);
            }
            Outcome::TransientFailure(error) => {
                self.resolve_failure(operation, FailureKind::Transient, error, now);
            }
            Outcome::TerminalFailure(error) => {
                self.resolve_failure(operation, FailureKind::Terminal, error, now);
            }
        }
    }

    fn resolve_failure(
        &mut self,
        operation: Operation,
        kind: FailureKind,
        error: anyhow::Error,
        now: Instant,
    ) {
        match self.retries.on_failure(operation, kind, error, now) {
            Resolution::Requeue(operation) => {
                self.record(
                    operation.id(),
                    operation.priority(),
                    AuditAction::Retry,
                    operation.last_error().map(str::to_owned),
                );
                self.push(operation, now);
            }
            Resolution::Park { operation, delay } => {
                self.record(
                    operation.id(),
                    operation.priority(),
                    AuditAction::Retry,
                    operation.last_error().map(str::to_owned),
                );
                self.park(operation, delay);
            }
            Resolution::DeadLettered(entry) => {
                self.record(
                    entry.id,
                    entry.priority,
                    AuditAction::DeadLetter,
                    Some(entry.last_error),
                );
            }
        }
    }

    fn park(&mut self, operation: Operation, delay: Duration) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.parked.insert(operation.id(), cancel_tx);
        let commands = self.commands.clone();
        self.spawner.spawn(Box::pin(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = cancel_rx => {
                    operation.job.reject(QueueError::Shutdown);
                    return;
                }
            }
            let Some(tx) = commands.upgrade() else {
                operation.job.reject(QueueError::Shutdown);
                return;
            };
            if let Err(SendError(Command::RetryDue(operation))) =
                tx.send(Command::RetryDue(operation))
            {
                operation.job.reject(QueueError::Shutdown);
            }
        }));
    }

    fn replay(&mut self, id: &OperationId, now: Instant) -> bool {
        let Some((entry, job)) = self.retries.dead_letters().take(id, now) else {
            return false;
        };
        tracing::info!(
            id = %entry.id,
            priority = %entry.priority,
            previous_retries = entry.retry_count,
            "replaying dead letter"
        );
        let operation = Operation::new(entry.id, entry.name, entry.priority, job);
        self.record(entry.id, entry.priority, AuditAction::Replay, None);
        self.push(operation, now);
        true
    }

    fn push(&mut self, mut operation: Operation, now: Instant) {
        operation.enter_lane(now);
        self.lanes.lane_mut(operation.priority()).push_tail(operation);
        self.update_backlog();
    }

    fn update_backlog(&mut self) {
        let waiting = self.lanes.total_len();
        let mark = self.config.high_water_mark;
        if waiting >= mark {
            if !self.backlog_warning {
                self.backlog_warning = true;
                tracing::warn!(waiting, high_water_mark = mark, "queue backlog reached high-water mark");
            }
        } else if self.backlog_warning {
            self.backlog_warning = false;
            tracing::info!(waiting, high_water_mark = mark, "queue backlog back under high-water mark");
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn stats(&self) -> QueueStats {
        let waiting_retries = self
            .lanes
            .iter()
            .flat_map(|lane| lane.iter())
            .filter(|op| op.retry_count() > 0)
            .count();
        let avg_wait_ms = if self.total_admitted == 0 {
            0.0
        } else {
            self.total_wait.as_secs_f64() * 1_000.0 / self.total_admitted as f64
        };
        QueueStats {
            queue_lengths: self.lanes.lengths(),
            total_queued: self.lanes.total_len(),
            in_flight: self.leases.len(),
            pending_retries: self.parked.len() + waiting_retries,
            total_retries: self.retries.total_retries(),
            total_completed: self.total_completed,
            total_dead_lettered: self.retries.total_dead_lettered(),
            total_admitted: self.total_admitted,
            dlq_size: self.retries.dead_letter_count(),
            avg_wait_ms,
            throttled_ticks: self.throttled_ticks,
            backlog_warning: self.backlog_warning,
            throttle_events: self.throttle.throttle_events(),
            tokens_available: self.throttle.tokens_available(),
            resources: self.sampler.latest().as_ref().clone(),
            limits: QueueLimits::from(self.config.as_ref()),
        }
    }

    fn shutdown(&mut self) {
        let waiting = self.lanes.drain();
        let leased = self.leases.drain();
        tracing::info!(
            waiting = waiting.len(),
            in_flight = leased.len(),
            parked = self.parked.len(),
            "admission loop shutting down"
        );
        for operation in waiting.into_iter().chain(leased) {
            operation.job.reject(QueueError::Shutdown);
        }
        // Dropping the switches wakes every backoff timer, which rejects its caller.
        self.parked.clear();
    }

    fn record(&self, id: OperationId, priority: Priority, action: AuditAction, detail: Option<String>) {
        if let Some(sink) = &self.audit {
            sink.record(build_audit_event(id, priority, action, detail));
        }
    }
}
