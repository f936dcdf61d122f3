use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::runner::SyncJobRunner;
use crate::sync::{PollPolicy, SyncJobStatus, SyncSnapshot, SyncTarget, TriggerOutcome};

/// Events emitted by the coordinator for monitoring/logging.
#[derive(Debug, Clone)]
pub enum SyncEvent<'a> {
    LoopStarted {
        target: &'a SyncTarget,
    },
    Polled {
        target: &'a SyncTarget,
        status: SyncJobStatus,
        next_poll: Duration,
    },
    PollFailed {
        target: &'a SyncTarget,
        error: &'a AppError,
        next_poll: Duration,
    },
    /// A status read finished after its loop was cancelled.
    ReadDiscarded {
        target: &'a SyncTarget,
    },
    LoopStopped {
        target: &'a SyncTarget,
    },
    Triggered {
        target: &'a SyncTarget,
    },
    TriggerSuppressed {
        target: &'a SyncTarget,
    },
}

/// Trait for receiving coordinator events (decoupled logging).
pub trait SyncReporter: Send + Sync + 'static {
    fn report(&self, event: SyncEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSyncReporter;

impl SyncReporter for TracingSyncReporter {
    fn report(&self, event: SyncEvent<'_>) {
        match event {
            SyncEvent::LoopStarted { target } => {
                tracing::info!(%target, "Sync poll loop started");
            }
            SyncEvent::Polled {
                target,
                status,
                next_poll,
            } => {
                tracing::debug!(%target, %status, next_poll_ms = next_poll.as_millis() as u64, "Sync status polled");
            }
            SyncEvent::PollFailed {
                target,
                error,
                next_poll,
            } => {
                tracing::warn!(%target, %error, next_poll_ms = next_poll.as_millis() as u64, "Sync status read failed");
            }
            SyncEvent::ReadDiscarded { target } => {
                tracing::debug!(%target, "Discarding status read from cancelled loop");
            }
            SyncEvent::LoopStopped { target } => {
                tracing::info!(%target, "Sync poll loop stopped");
            }
            SyncEvent::Triggered { target } => {
                tracing::info!(%target, "Sync dispatched");
            }
            SyncEvent::TriggerSuppressed { target } => {
                tracing::info!(%target, "Sync trigger suppressed, previous trigger still outstanding");
            }
        }
    }
}

type SnapshotSender = watch::Sender<Option<SyncSnapshot>>;

struct PollLoop {
    generation: u64,
    sender: Arc<SnapshotSender>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
    subscribers: usize,
}

#[derive(Default)]
struct LoopTable {
    loops: Mutex<HashMap<SyncTarget, PollLoop>>,
    generations: AtomicU64,
}

impl LoopTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<SyncTarget, PollLoop>> {
        self.loops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, target: &SyncTarget, generation: u64) {
        let mut loops = self.lock();
        let Some(entry) = loops.get_mut(target) else {
            return;
        };
        if entry.generation != generation {
            return;
        }
        entry.subscribers = entry.subscribers.saturating_sub(1);
        if entry.subscribers == 0 {
            if let Some(entry) = loops.remove(target) {
                entry.cancel.cancel();
            }
        }
    }

    fn wake(&self, target: &SyncTarget) {
        if let Some(entry) = self.lock().get(target) {
            entry.wake.notify_one();
        }
    }
}

/// A live view of one target's sync status.
///
/// Dropping the subscription (or calling [`Subscription::unsubscribe`])
/// releases it; the shared poll loop stops once its last subscriber is gone.
pub struct Subscription {
    target: SyncTarget,
    generation: u64,
    receiver: watch::Receiver<Option<SyncSnapshot>>,
    table: Arc<LoopTable>,
}

impl Subscription {
    pub fn target(&self) -> &SyncTarget {
        &self.target
    }

    /// The latest snapshot, if the first status read has completed.
    pub fn current(&self) -> Option<SyncSnapshot> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next observation. Returns `None` once the loop is gone.
    pub async fn next(&mut self) -> Option<SyncSnapshot> {
        loop {
            self.receiver.changed().await.ok()?;
            if let Some(snapshot) = self.receiver.borrow_and_update().clone() {
                return Some(snapshot);
            }
        }
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.table.release(&self.target, self.generation);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("target", &self.target)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Removes a target from the in-flight set when the trigger finishes or is
/// dropped mid-dispatch.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<SyncTarget>>,
    target: &'a SyncTarget,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(self.target);
    }
}

/// Triggers syncs on an external runner and observes their status with one
/// adaptive poll loop per target, shared by all of the target's subscribers.
///
/// Status reads are eventually consistent: a successful trigger may be
/// followed by a brief `Idle` observation before the runner reports `Syncing`.
pub struct SyncCoordinator<R, SR = TracingSyncReporter> {
    runner: R,
    policy: PollPolicy,
    reporter: Arc<SR>,
    table: Arc<LoopTable>,
    in_flight: Arc<Mutex<HashSet<SyncTarget>>>,
}

impl<R: Clone, SR> Clone for SyncCoordinator<R, SR> {
    fn clone(&self) -> Self {
        Self {
            runner: self.runner.clone(),
            policy: self.policy.clone(),
            reporter: Arc::clone(&self.reporter),
            table: Arc::clone(&self.table),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<R: SyncJobRunner> SyncCoordinator<R> {
    pub fn new(runner: R, policy: PollPolicy) -> Self {
        Self::with_reporter(runner, policy, TracingSyncReporter)
    }
}

impl<R: SyncJobRunner, SR: SyncReporter> SyncCoordinator<R, SR> {
    pub fn with_reporter(runner: R, policy: PollPolicy, reporter: SR) -> Self {
        Self {
            runner,
            policy,
            reporter: Arc::new(reporter),
            table: Arc::new(LoopTable::default()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Dispatch a sync to the runner.
    ///
    /// A second trigger for a target whose previous dispatch is still
    /// outstanding is suppressed locally. On success the target's poll loop,
    /// if any, is woken to read status early.
    pub async fn trigger(&self, target: &SyncTarget) -> Result<TriggerOutcome, AppError> {
        let newly_inserted = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.clone());
        if !newly_inserted {
            self.reporter.report(SyncEvent::TriggerSuppressed { target });
            return Ok(TriggerOutcome::Suppressed);
        }
        let _in_flight = InFlight {
            set: &self.in_flight,
            target,
        };

        self.runner.dispatch(target).await?;
        self.reporter.report(SyncEvent::Triggered { target });
        self.table.wake(target);

        Ok(TriggerOutcome::Dispatched)
    }

    /// Start (or join) the poll loop for `target`.
    ///
    /// Must be called from within a tokio runtime. Fails with
    /// [`AppError::TrackingLimit`] when the policy's target limit is reached
    /// and `target` is not already tracked.
    pub fn subscribe(&self, target: SyncTarget) -> Result<Subscription, AppError> {
        let mut loops = self.table.lock();

        if let Some(existing) = loops.get_mut(&target) {
            existing.subscribers += 1;
            return Ok(Subscription {
                receiver: existing.sender.subscribe(),
                generation: existing.generation,
                target,
                table: Arc::clone(&self.table),
            });
        }

        if let Some(limit) = self
            .policy
            .max_tracked_targets
            .filter(|limit| loops.len() >= *limit)
        {
            return Err(AppError::TrackingLimit { limit });
        }

        let (sender, receiver) = watch::channel(None);
        let sender = Arc::new(sender);
        let wake = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let generation = self.table.generations.fetch_add(1, Ordering::Relaxed);

        loops.insert(
            target.clone(),
            PollLoop {
                generation,
                sender: Arc::clone(&sender),
                wake: Arc::clone(&wake),
                cancel: cancel.clone(),
                subscribers: 1,
            },
        );
        drop(loops);

        tokio::spawn(poll_loop(
            self.runner.clone(),
            self.policy.clone(),
            Arc::clone(&self.reporter),
            target.clone(),
            sender,
            wake,
            cancel,
        ));

        Ok(Subscription {
            target,
            generation,
            receiver,
            table: Arc::clone(&self.table),
        })
    }

    /// Latest snapshot of a tracked target.
    pub fn snapshot(&self, target: &SyncTarget) -> Option<SyncSnapshot> {
        self.table
            .lock()
            .get(target)
            .and_then(|entry| entry.sender.borrow().clone())
    }

    /// One status read outside any poll loop.
    pub async fn read_now(&self, target: &SyncTarget) -> Result<SyncSnapshot, AppError> {
        read_snapshot(&self.runner, target).await
    }

    pub fn tracked_targets(&self) -> usize {
        self.table.lock().len()
    }

    pub fn subscriber_count(&self, target: &SyncTarget) -> usize {
        self.table
            .lock()
            .get(target)
            .map_or(0, |entry| entry.subscribers)
    }

    /// Cancel every poll loop. Existing subscriptions see `None` from
    /// [`Subscription::next`] once their loop exits.
    pub fn shutdown(&self) {
        let drained: Vec<PollLoop> = self.table.lock().drain().map(|(_, entry)| entry).collect();
        for entry in drained {
            entry.cancel.cancel();
        }
    }
}

async fn read_snapshot<R: SyncJobRunner>(
    runner: &R,
    target: &SyncTarget,
) -> Result<SyncSnapshot, AppError> {
    match target {
        SyncTarget::Resource(id) => {
            let report = runner.resource_status(id).await?;
            Ok(SyncSnapshot::for_resource(target.clone(), report))
        }
        SyncTarget::Endpoint(id) => {
            let status = runner.endpoint_status(id).await?;
            Ok(SyncSnapshot::for_endpoint(target.clone(), status))
        }
    }
}

async fn poll_loop<R: SyncJobRunner, SR: SyncReporter>(
    runner: R,
    policy: PollPolicy,
    reporter: Arc<SR>,
    target: SyncTarget,
    sender: Arc<SnapshotSender>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
) {
    reporter.report(SyncEvent::LoopStarted { target: &target });

    let mut syncing = false;
    loop {
        // Reads are never aborted mid-flight; a result that lands after
        // cancellation is dropped.
        let result = read_snapshot(&runner, &target).await;
        if cancel.is_cancelled() {
            reporter.report(SyncEvent::ReadDiscarded { target: &target });
            break;
        }

        match result {
            Ok(snapshot) => {
                syncing = snapshot.is_syncing();
                let status = snapshot.status;
                sender.send_replace(Some(snapshot));
                reporter.report(SyncEvent::Polled {
                    target: &target,
                    status,
                    next_poll: policy.next_delay(syncing),
                });
            }
            Err(error) => {
                let message = error.to_string();
                sender.send_modify(|current| {
                    if let Some(snapshot) = current {
                        snapshot.last_error = Some(message);
                    }
                });
                reporter.report(SyncEvent::PollFailed {
                    target: &target,
                    error: &error,
                    next_poll: policy.next_delay(syncing),
                });
            }
        }

        tokio::select! {
            () = tokio::time::sleep(policy.next_delay(syncing)) => {}
            () = wake.notified() => {}
            () = cancel.cancelled() => break,
        }
    }

    reporter.report(SyncEvent::LoopStopped { target: &target });
}
