//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::coordinator::{SyncEvent, SyncReporter};
use crate::error::AppError;
use crate::probe::{ProbeError, ProbeRequest, ProbeResult, Prober};
use crate::runner::SyncJobRunner;
use crate::sync::{ResourceSyncReport, SyncJobStatus, SyncTarget};

// ---------------------------------------------------------------------------
// MockProber
// ---------------------------------------------------------------------------

/// Mock prober that returns queued responses and records requests.
#[derive(Clone, Default)]
pub struct MockProber {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns an empty JSON object with status 200.
    responses: Arc<Mutex<Vec<Result<ProbeResult, ProbeError>>>>,
    requests: Arc<Mutex<Vec<ProbeRequest>>>,
}

impl MockProber {
    /// Creates a prober answering with `body` and status 200.
    pub fn new(body: Value) -> Self {
        Self::with_responses(vec![Ok(ProbeResult {
            status: 200,
            body,
            elapsed_ms: 1,
        })])
    }

    pub fn with_error(error: ProbeError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<ProbeResult, ProbeError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ProbeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Prober for MockProber {
    async fn probe(&self, request: &ProbeRequest) -> Result<ProbeResult, ProbeError> {
        self.requests.lock().unwrap().push(request.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(ProbeResult {
                status: 200,
                body: Value::Object(Default::default()),
                elapsed_ms: 1,
            })
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockSyncRunner
// ---------------------------------------------------------------------------

/// Mock job runner with scripted status reads.
///
/// Status queues pop one entry per read; the last `Ok` entry repeats forever.
/// Empty queues answer `Idle`.
#[derive(Clone, Default)]
pub struct MockSyncRunner {
    endpoint_statuses: Arc<Mutex<VecDeque<Result<SyncJobStatus, AppError>>>>,
    resource_reports: Arc<Mutex<VecDeque<Result<ResourceSyncReport, AppError>>>>,
    dispatch_error: Arc<Mutex<Option<AppError>>>,
    dispatched: Arc<Mutex<Vec<SyncTarget>>>,
    reads: Arc<Mutex<Vec<(SyncTarget, Instant)>>>,
    read_delay: Option<Duration>,
    dispatch_delay: Option<Duration>,
}

impl MockSyncRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint_statuses(self, statuses: Vec<Result<SyncJobStatus, AppError>>) -> Self {
        *self.endpoint_statuses.lock().unwrap() = statuses.into();
        self
    }

    pub fn with_resource_reports(self, reports: Vec<Result<ResourceSyncReport, AppError>>) -> Self {
        *self.resource_reports.lock().unwrap() = reports.into();
        self
    }

    /// The next dispatch fails with `error`; later dispatches succeed.
    pub fn with_dispatch_error(self, error: AppError) -> Self {
        *self.dispatch_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn with_dispatch_delay(mut self, delay: Duration) -> Self {
        self.dispatch_delay = Some(delay);
        self
    }

    pub fn dispatched(&self) -> Vec<SyncTarget> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn read_count(&self) -> usize {
        self.reads.lock().unwrap().len()
    }

    /// Start instants of every status read (tokio clock).
    pub fn read_instants(&self) -> Vec<Instant> {
        self.reads.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }

    async fn record_read(&self, target: SyncTarget) {
        self.reads.lock().unwrap().push((target, Instant::now()));
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn next_scripted<T: Clone>(queue: &Mutex<VecDeque<Result<T, AppError>>>, fallback: T) -> Result<T, AppError> {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        return queue.pop_front().unwrap();
    }
    match queue.front() {
        Some(Ok(value)) => Ok(value.clone()),
        Some(Err(_)) => queue.pop_front().unwrap(),
        None => Ok(fallback),
    }
}

impl SyncJobRunner for MockSyncRunner {
    async fn dispatch(&self, target: &SyncTarget) -> Result<(), AppError> {
        if let Some(delay) = self.dispatch_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.dispatch_error.lock().unwrap().take() {
            return Err(error);
        }
        self.dispatched.lock().unwrap().push(target.clone());
        Ok(())
    }

    async fn resource_status(&self, resource_id: &str) -> Result<ResourceSyncReport, AppError> {
        self.record_read(SyncTarget::Resource(resource_id.to_string()))
            .await;
        next_scripted(&self.resource_reports, ResourceSyncReport::default())
    }

    async fn endpoint_status(&self, endpoint_id: &str) -> Result<SyncJobStatus, AppError> {
        self.record_read(SyncTarget::Endpoint(endpoint_id.to_string()))
            .await;
        next_scripted(&self.endpoint_statuses, SyncJobStatus::Idle)
    }
}

// ---------------------------------------------------------------------------
// MockSyncReporter
// ---------------------------------------------------------------------------

/// Reporter that records event names in order.
#[derive(Clone, Default)]
pub struct MockSyncReporter {
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl MockSyncReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl SyncReporter for MockSyncReporter {
    fn report(&self, event: SyncEvent<'_>) {
        let name = match event {
            SyncEvent::LoopStarted { .. } => "loop_started",
            SyncEvent::Polled { .. } => "polled",
            SyncEvent::PollFailed { .. } => "poll_failed",
            SyncEvent::ReadDiscarded { .. } => "read_discarded",
            SyncEvent::LoopStopped { .. } => "loop_stopped",
            SyncEvent::Triggered { .. } => "triggered",
            SyncEvent::TriggerSuppressed { .. } => "trigger_suppressed",
        };
        self.events.lock().unwrap().push(name);
    }
}
