pub mod collections;
pub mod coordinator;
pub mod error;
pub mod fields;
pub mod onboarding;
pub mod path;
pub mod probe;
pub mod resource;
pub mod runner;
pub mod sync;
pub mod validate;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use collections::{CollectionCandidate, discover_collections};
pub use coordinator::{Subscription, SyncCoordinator, SyncEvent, SyncReporter, TracingSyncReporter};
pub use error::AppError;
pub use fields::{FieldCandidate, FieldDiscovery, ValueType, discover_all_fields, discover_fields};
pub use onboarding::{DiscoverySource, EndpointSuggestion, OnboardingService, suggest_endpoint};
pub use path::{NotFound, PathError, PathExpression, Segment};
pub use probe::{ProbeError, ProbeErrorKind, ProbeFailure, ProbeRequest, ProbeResult, Prober};
pub use resource::{
    ApiKeyLocation, AuthSpec, CanonicalField, EndpointSpec, HttpMethod, KeyValue, PaginationKind,
    PaginationSpec, RateLimit, ResourceConfig,
};
pub use runner::SyncJobRunner;
pub use sync::{
    EndpointSyncState, PollPolicy, ResourceSyncReport, SyncJobStatus, SyncSnapshot, SyncTarget,
    TriggerOutcome,
};
pub use validate::{ValidationError, ValidationErrors, validate};
