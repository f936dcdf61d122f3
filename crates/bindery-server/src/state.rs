use bindery_client::{HttpSyncRunner, ReqwestProber};
use bindery_core::{AppError, OnboardingService, SyncCoordinator, SyncTarget};

use crate::config::ServerConfig;

/// Reads without a `Syncing` observation before a tracked target is released.
const SETTLE_IDLE_READS: usize = 3;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub onboarding: OnboardingService<ReqwestProber>,
    pub sync: SyncCoordinator<HttpSyncRunner>,
    /// API key protecting the `/v1` routes.
    pub api_key: String,
}

impl AppState {
    pub fn from_config(config: &ServerConfig) -> Result<Self, AppError> {
        let mut prober = ReqwestProber::new()?;
        if config.allow_private_urls {
            prober = prober.allow_private_urls();
        }
        let runner = HttpSyncRunner::new(&config.runner_url, config.runner_token.clone())?;

        Ok(Self {
            onboarding: OnboardingService::new(prober),
            sync: SyncCoordinator::new(runner, config.poll.clone()),
            api_key: config.api_key.clone(),
        })
    }

    /// Keep a poll loop on `target` until a sync observed running has
    /// finished, or until a few reads pass without it ever starting.
    ///
    /// Gives `GET /v1/sync/...` a cached, adaptively refreshed snapshot for
    /// recently triggered targets.
    pub fn track_until_settled(&self, target: SyncTarget) {
        let mut subscription = match self.sync.subscribe(target.clone()) {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(%target, error = %e, "Not tracking triggered sync");
                return;
            }
        };

        tokio::spawn(async move {
            let mut seen_syncing = false;
            let mut idle_reads = 0;
            while let Some(snapshot) = subscription.next().await {
                if snapshot.is_syncing() {
                    seen_syncing = true;
                } else if seen_syncing {
                    break;
                } else {
                    idle_reads += 1;
                    if idle_reads >= SETTLE_IDLE_READS {
                        break;
                    }
                }
            }
            tracing::debug!(target = %subscription.target(), "Released tracked sync");
        });
    }
}
