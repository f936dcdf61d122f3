use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Status of a sync job as reported by the external job runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    #[default]
    Idle,
    Syncing,
    Failed,
    Completed,
}

impl SyncJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobStatus::Idle => "idle",
            SyncJobStatus::Syncing => "syncing",
            SyncJobStatus::Failed => "failed",
            SyncJobStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncJobStatus::Completed | SyncJobStatus::Failed)
    }
}

impl fmt::Display for SyncJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SyncJobStatus::Idle),
            "syncing" => Ok(SyncJobStatus::Syncing),
            "failed" => Ok(SyncJobStatus::Failed),
            "completed" => Ok(SyncJobStatus::Completed),
            _ => Err(format!("Unknown sync status: {}", s)),
        }
    }
}

/// What a sync is triggered for or observed on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum SyncTarget {
    Resource(String),
    Endpoint(String),
}

impl SyncTarget {
    /// Build a target from a kind word (`resource(s)` / `endpoint(s)`) and id.
    pub fn from_parts(kind: &str, id: &str) -> Result<Self, AppError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(AppError::Generic("Sync target id must not be empty".into()));
        }
        match kind.to_lowercase().as_str() {
            "resource" | "resources" => Ok(SyncTarget::Resource(id.to_string())),
            "endpoint" | "endpoints" => Ok(SyncTarget::Endpoint(id.to_string())),
            other => Err(AppError::Generic(format!(
                "Unknown sync target kind '{other}': expected 'resource' or 'endpoint'"
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncTarget::Resource(_) => "resource",
            SyncTarget::Endpoint(_) => "endpoint",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SyncTarget::Resource(id) | SyncTarget::Endpoint(id) => id,
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// One endpoint's status inside a resource status read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSyncState {
    pub id: String,
    pub sync_status: SyncJobStatus,
}

/// The runner's answer to a resource status read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSyncReport {
    #[serde(default)]
    pub endpoints: Vec<EndpointSyncState>,
    #[serde(default)]
    pub sync_status: SyncJobStatus,
}

impl ResourceSyncReport {
    pub fn is_syncing(&self) -> bool {
        self.sync_status == SyncJobStatus::Syncing
            || self
                .endpoints
                .iter()
                .any(|e| e.sync_status == SyncJobStatus::Syncing)
    }

    /// `Syncing` when the resource or any endpoint is syncing, otherwise the
    /// runner's own resource status. Terminal endpoint states are not folded
    /// into a resource-level outcome.
    pub fn aggregate(&self) -> SyncJobStatus {
        if self.is_syncing() {
            SyncJobStatus::Syncing
        } else {
            self.sync_status
        }
    }
}

/// Immutable view of a target's last observed status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub target: SyncTarget,
    pub status: SyncJobStatus,
    /// Per-endpoint states; empty for endpoint targets.
    pub endpoints: Vec<EndpointSyncState>,
    pub observed_at: DateTime<Utc>,
    /// Error from the most recent read, if it failed after this status was
    /// observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SyncSnapshot {
    pub fn for_resource(target: SyncTarget, report: ResourceSyncReport) -> Self {
        Self {
            status: report.aggregate(),
            target,
            endpoints: report.endpoints,
            observed_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn for_endpoint(target: SyncTarget, status: SyncJobStatus) -> Self {
        Self {
            target,
            status,
            endpoints: Vec::new(),
            observed_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.status == SyncJobStatus::Syncing
    }
}

/// Result of a trigger call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// The runner accepted the dispatch.
    Dispatched,
    /// A trigger for the same target was still outstanding; nothing was sent.
    Suppressed,
}

/// Adaptive polling policy for the sync coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Interval while the observed status is `Syncing`.
    pub fast_interval: Duration,
    /// Interval otherwise.
    pub slow_interval: Duration,
    /// Upper bound on concurrently polled targets. `None` polls every
    /// subscribed target.
    pub max_tracked_targets: Option<usize>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_millis(2500),
            slow_interval: Duration::from_secs(30),
            max_tracked_targets: None,
        }
    }
}

impl PollPolicy {
    /// Read overrides from `BINDERY_POLL_FAST_MS`, `BINDERY_POLL_SLOW_SECS`
    /// and `BINDERY_POLL_MAX_TARGETS`.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let fast_interval = match lookup("BINDERY_POLL_FAST_MS") {
            None => defaults.fast_interval,
            Some(raw) => Duration::from_millis(positive_integer("BINDERY_POLL_FAST_MS", &raw)?),
        };
        let slow_interval = match lookup("BINDERY_POLL_SLOW_SECS") {
            None => defaults.slow_interval,
            Some(raw) => Duration::from_secs(positive_integer("BINDERY_POLL_SLOW_SECS", &raw)?),
        };
        let max_tracked_targets = match lookup("BINDERY_POLL_MAX_TARGETS") {
            None => None,
            Some(raw) => Some(positive_integer("BINDERY_POLL_MAX_TARGETS", &raw)? as usize),
        };

        if fast_interval > slow_interval {
            return Err(AppError::ConfigError(format!(
                "BINDERY_POLL_FAST_MS ({} ms) must not exceed BINDERY_POLL_SLOW_SECS ({} s)",
                fast_interval.as_millis(),
                slow_interval.as_secs()
            )));
        }

        Ok(Self {
            fast_interval,
            slow_interval,
            max_tracked_targets,
        })
    }

    pub fn with_max_tracked_targets(mut self, limit: usize) -> Self {
        self.max_tracked_targets = Some(limit);
        self
    }

    /// Delay before the next status read.
    pub fn next_delay(&self, syncing: bool) -> Duration {
        if syncing {
            self.fast_interval
        } else {
            self.slow_interval
        }
    }
}

fn positive_integer(name: &str, raw: &str) -> Result<u64, AppError> {
    let parsed: u64 = raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!("Invalid {name} '{raw}': must be a positive integer"))
    })?;
    if parsed == 0 {
        return Err(AppError::ConfigError(format!("{name} must be at least 1")));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SyncJobStatus::Idle,
            SyncJobStatus::Syncing,
            SyncJobStatus::Failed,
            SyncJobStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<SyncJobStatus>().unwrap(), status);
        }
        assert!("running".parse::<SyncJobStatus>().is_err());
        assert!(SyncJobStatus::Failed.is_terminal());
        assert!(!SyncJobStatus::Syncing.is_terminal());
    }

    #[test]
    fn test_target_from_parts() {
        assert_eq!(
            SyncTarget::from_parts("resources", "r1").unwrap(),
            SyncTarget::Resource("r1".into())
        );
        assert_eq!(
            SyncTarget::from_parts("Endpoint", " e1 ").unwrap(),
            SyncTarget::Endpoint("e1".into())
        );
        assert!(SyncTarget::from_parts("job", "x").is_err());
        assert!(SyncTarget::from_parts("resource", "  ").is_err());
        assert_eq!(SyncTarget::Endpoint("e1".into()).to_string(), "endpoint:e1");
    }

    #[test]
    fn test_target_serde_shape() {
        let json = serde_json::to_value(SyncTarget::Resource("r1".into())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "resource", "id": "r1"}));
    }

    #[test]
    fn test_resource_aggregate() {
        let mut report = ResourceSyncReport {
            endpoints: vec![
                EndpointSyncState {
                    id: "a".into(),
                    sync_status: SyncJobStatus::Completed,
                },
                EndpointSyncState {
                    id: "b".into(),
                    sync_status: SyncJobStatus::Syncing,
                },
            ],
            sync_status: SyncJobStatus::Idle,
        };
        assert_eq!(report.aggregate(), SyncJobStatus::Syncing);

        report.endpoints[1].sync_status = SyncJobStatus::Failed;
        assert_eq!(report.aggregate(), SyncJobStatus::Idle);

        report.sync_status = SyncJobStatus::Syncing;
        assert_eq!(report.aggregate(), SyncJobStatus::Syncing);
    }

    #[test]
    fn test_resource_report_defaults() {
        let report: ResourceSyncReport = serde_json::from_str("{}").unwrap();
        assert!(report.endpoints.is_empty());
        assert_eq!(report.sync_status, SyncJobStatus::Idle);
    }

    #[test]
    fn test_poll_policy_defaults_in_windows() {
        let policy = PollPolicy::default();
        let fast = policy.next_delay(true);
        assert!(fast >= Duration::from_secs(2) && fast <= Duration::from_secs(3));
        assert_eq!(policy.next_delay(false), Duration::from_secs(30));
        assert_eq!(policy.max_tracked_targets, None);
    }

    #[test]
    fn test_poll_policy_from_lookup() {
        let policy = PollPolicy::from_lookup(lookup(&[
            ("BINDERY_POLL_FAST_MS", "2000"),
            ("BINDERY_POLL_SLOW_SECS", "60"),
            ("BINDERY_POLL_MAX_TARGETS", "4"),
        ]))
        .unwrap();
        assert_eq!(policy.fast_interval, Duration::from_secs(2));
        assert_eq!(policy.slow_interval, Duration::from_secs(60));
        assert_eq!(policy.max_tracked_targets, Some(4));

        let policy = PollPolicy::from_lookup(lookup(&[])).unwrap();
        assert_eq!(policy, PollPolicy::default());
    }

    #[test]
    fn test_poll_policy_rejects_bad_values() {
        let err = PollPolicy::from_lookup(lookup(&[("BINDERY_POLL_FAST_MS", "soon")])).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));

        let err = PollPolicy::from_lookup(lookup(&[("BINDERY_POLL_MAX_TARGETS", "0")])).unwrap_err();
        assert!(err.to_string().contains("at least 1"));

        let err = PollPolicy::from_lookup(lookup(&[
            ("BINDERY_POLL_FAST_MS", "90000"),
            ("BINDERY_POLL_SLOW_SECS", "30"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("must not exceed"));
    }
}
