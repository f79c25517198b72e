use std::sync::Arc;

use storyline_store::types::AssetType;
use storyline_store::RowStore;
use tokio::sync::watch;
use tracing::{error, info};

use crate::dispatch::{dispatch_best_effort, ContentAgentDispatcher};
use crate::error::Result;
use crate::types::{AssetWorkerConfig, GenerateAssetPayload};

/// Leases queued asset jobs and fires the generation RPC (§4.8.2).
pub struct AssetWorker {
    store: Arc<RowStore>,
    dispatcher: Arc<dyn ContentAgentDispatcher>,
    config: AssetWorkerConfig,
}

impl AssetWorker {
    pub fn new(store: Arc<RowStore>, dispatcher: Arc<dyn ContentAgentDispatcher>, config: AssetWorkerConfig) -> Self {
        Self { store, dispatcher, config }
    }

    /// One tick: lease up to `batch_size` queued jobs and dispatch each.
    /// The CAS lease itself lives in `RowStore::lease_queued_asset_jobs`
    /// (`UPDATE … WHERE status='queued'`) — this method never re-derives it.
    pub async fn tick(&self) -> Result<usize> {
        let leased = self.store.lease_queued_asset_jobs(self.config.batch_size)?;
        for job in &leased {
            let story = self.store.get_story(&job.story_id)?;
            let story_json = serde_json::to_value(&story)?;
            let payload = GenerateAssetPayload::new(
                &job.story_id,
                job.asset_type,
                &job.id,
                &story.creator_user_id,
                story_json,
            );
            info!(job_id = %job.id, story_id = %job.story_id, asset_type = %job.asset_type, "leased asset job");
            dispatch_best_effort(self.dispatcher.as_ref(), &payload).await;
        }
        Ok(leased.len())
    }

    /// Runs until `shutdown` broadcasts `true`. Mirrors the fixed-interval
    /// tick-then-select shape every scheduled loop in this codebase uses.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(tick_secs = self.config.tick_interval_secs, "asset worker started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.tick_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("asset worker tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("asset worker shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Exposed for the orchestrator's reference-isolation telemetry (§4.8.3):
/// true for any beat (`scene_*`), false otherwise.
pub fn references_cover_only(asset_type: AssetType) -> bool {
    asset_type.is_beat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use storyline_store::types::JobPriority;

    struct CountingDispatcher(AtomicUsize);

    #[async_trait]
    impl ContentAgentDispatcher for CountingDispatcher {
        async fn generate_asset(&self, _payload: &GenerateAssetPayload) -> std::result::Result<(), crate::dispatch::DispatchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn store_with_story() -> Arc<RowStore> {
        let conn = Connection::open_in_memory().unwrap();
        storyline_store::db::init_db(&conn).unwrap();
        let store = Arc::new(RowStore::new(conn));
        store.create_story("story-1", "user-1", None).unwrap();
        store.create_asset_jobs("story-1", JobPriority::Normal).unwrap();
        store
    }

    #[tokio::test]
    async fn tick_leases_up_to_batch_size_and_dispatches_each() {
        let store = store_with_story();
        let dispatcher = Arc::new(CountingDispatcher(AtomicUsize::new(0)));
        let worker = AssetWorker::new(store.clone(), dispatcher.clone(), AssetWorkerConfig { batch_size: 3, tick_interval_secs: 5 });

        let leased = worker.tick().await.unwrap();
        assert_eq!(leased, 3);
        assert_eq!(dispatcher.0.load(Ordering::SeqCst), 3);

        let jobs = store.list_asset_jobs_for_story("story-1").unwrap();
        let generating = jobs.iter().filter(|j| j.status == storyline_store::types::AssetJobStatus::Generating).count();
        // content starts generating already; 3 more leased from queued.
        assert_eq!(generating, 4);
    }

    #[tokio::test]
    async fn tick_does_not_release_already_leased_jobs() {
        let store = store_with_story();
        let dispatcher = Arc::new(CountingDispatcher(AtomicUsize::new(0)));
        let worker = AssetWorker::new(store.clone(), dispatcher.clone(), AssetWorkerConfig { batch_size: 100, tick_interval_secs: 5 });

        let first = worker.tick().await.unwrap();
        let second = worker.tick().await.unwrap();
        assert_eq!(first, 8); // everything but content, which started generating already
        assert_eq!(second, 0);
    }

    #[test]
    fn beat_types_reference_cover_only() {
        assert!(references_cover_only(AssetType::Scene3));
        assert!(!references_cover_only(AssetType::Pdf));
    }
}
