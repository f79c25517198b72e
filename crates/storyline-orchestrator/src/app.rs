use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use storyline_continuity::ContinuityManager;
use storyline_core::config::StorylineConfig;
use storyline_intent::IntentClassifier;
use storyline_jobs::{AssetWorker, ContentAgentDispatcher, JobManager, TimeoutSweeper};
use storyline_quota::QuotaGate;
use storyline_safety::SafetyModerator;
use storyline_store::{KvCache, RowStore};

use crate::dispatch::SyncAgentDispatcher;

/// Central shared state — passed as `Arc<AppState>` to every Axum handler
/// and to the two scheduled background loops (§4.7, §4.8).
pub struct AppState {
    pub config: StorylineConfig,
    pub store: Arc<RowStore>,
    pub kv: Arc<dyn KvCache>,
    pub continuity: ContinuityManager,
    pub intent_classifier: IntentClassifier,
    pub safety: SafetyModerator,
    pub quota: QuotaGate,
    pub jobs: JobManager,
    /// `None` when no synchronous agent endpoint is configured — the turn
    /// handler falls back to `dispatch::NoopSyncAgentDispatcher`.
    pub sync_dispatcher: Option<Arc<dyn SyncAgentDispatcher>>,
}

impl AppState {
    pub fn new(
        config: StorylineConfig,
        store: Arc<RowStore>,
        kv: Arc<dyn KvCache>,
        continuity: ContinuityManager,
        intent_classifier: IntentClassifier,
        safety: SafetyModerator,
        quota: QuotaGate,
        jobs: JobManager,
        sync_dispatcher: Option<Arc<dyn SyncAgentDispatcher>>,
    ) -> Self {
        Self {
            config,
            store,
            kv,
            continuity,
            intent_classifier,
            safety,
            quota,
            jobs,
            sync_dispatcher,
        }
    }

    /// Background components share the same row store the turn pipeline
    /// uses, so a leased job and a turn-triggered job never disagree about
    /// the store's state.
    pub fn asset_worker(&self, dispatcher: Arc<dyn ContentAgentDispatcher>) -> AssetWorker {
        AssetWorker::new(
            self.store.clone(),
            dispatcher,
            storyline_jobs::AssetWorkerConfig {
                batch_size: self.config.scheduler.worker_batch_size,
                tick_interval_secs: self.config.scheduler.worker_tick_secs,
            },
        )
    }

    pub fn timeout_sweeper(&self) -> TimeoutSweeper {
        TimeoutSweeper::new(
            self.store.clone(),
            storyline_jobs::TimeoutSweeperConfig {
                stuck_after_minutes: self.config.scheduler.stuck_job_minutes,
                tick_interval_secs: self.config.scheduler.timeout_sweep_secs,
            },
        )
    }
}

/// Assemble the full Axum router (§6 external interfaces).
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/v1/turn", post(crate::http::turn::turn_handler))
        .route("/webhooks/{source}", post(crate::http::webhooks::webhook_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
