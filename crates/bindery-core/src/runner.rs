use std::future::Future;

use crate::error::AppError;
use crate::sync::{ResourceSyncReport, SyncJobStatus, SyncTarget};

/// External sync job runner: executes syncs and reports their status.
///
/// Bindery never runs a sync itself. It dispatches and observes.
pub trait SyncJobRunner: Send + Sync + Clone + 'static {
    /// Fire-and-forget dispatch. Success means the runner accepted the job,
    /// not that a status read will immediately show `Syncing`.
    fn dispatch(&self, target: &SyncTarget) -> impl Future<Output = Result<(), AppError>> + Send;

    fn resource_status(
        &self,
        resource_id: &str,
    ) -> impl Future<Output = Result<ResourceSyncReport, AppError>> + Send;

    fn endpoint_status(
        &self,
        endpoint_id: &str,
    ) -> impl Future<Output = Result<SyncJobStatus, AppError>> + Send;
}
