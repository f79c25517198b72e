use std::sync::Arc;

use storyline_store::types::{AssetGenerationStatus, AsyncJobRow, AsyncJobStatus, AsyncJobType, JobPriority};
use storyline_store::RowStore;
use tracing::info;

use crate::dispatch::{dispatch_best_effort, ContentAgentDispatcher};
use crate::error::Result;
use crate::types::{generate_job_id, CreateJobRequest, GenerateAssetPayload};

/// `createJob` / `getJobStatus` / `updateJobStatus` (§4.8.1). The orchestrator
/// is the sole caller on the inbound side; the Asset Worker and Timeout
/// Sweeper call `updateJobStatus`-equivalent row-store methods directly since
/// they already hold a leased row.
pub struct JobManager {
    store: Arc<RowStore>,
    dispatcher: Arc<dyn ContentAgentDispatcher>,
}

impl JobManager {
    pub fn new(store: Arc<RowStore>, dispatcher: Arc<dyn ContentAgentDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Steps 1-6 of §4.8.1. `story_id` is required for `story_generation`
    /// jobs — the orchestrator creates the story row before calling this
    /// (character creation already assigned the id).
    pub async fn create_job(&self, req: CreateJobRequest, story_id: Option<&str>) -> Result<AsyncJobRow> {
        let job_id = generate_job_id(chrono::Utc::now().timestamp_millis(), &random_suffix());
        let job = self.store.create_async_job(
            &job_id,
            &req.user_id,
            &req.session_id,
            req.job_type,
            req.request_data.clone(),
        )?;
        info!(job_id = %job_id, job_type = %req.job_type, "async job created");

        if req.job_type == AsyncJobType::StoryGeneration {
            let story_id = story_id
                .ok_or_else(|| crate::error::JobsError::Dispatch("story_generation requires a story_id".into()))?;
            self.store.create_asset_jobs(story_id, req.priority)?;
            self.store
                .save_asset_generation_status(story_id, &AssetGenerationStatus::initial())?;

            let story = self.store.get_story(story_id)?;
            let story_json = serde_json::to_value(&story)?;
            let payload = GenerateAssetPayload::new(
                story_id,
                storyline_store::types::AssetType::Content,
                &job_id,
                &req.user_id,
                story_json,
            );
            dispatch_best_effort(self.dispatcher.as_ref(), &payload).await;
        }

        Ok(job)
    }

    /// No cache read — jobs are not cached (§4.8.1).
    pub fn get_job_status(&self, job_id: &str) -> Result<AsyncJobRow> {
        Ok(self.store.get_async_job(job_id)?)
    }

    /// Idempotent on `ready`/`failed` — the row-store's `COALESCE` on
    /// `completed_at`/`result_data` means a repeat write is a no-op (§4.8.1).
    pub fn update_job_status(
        &self,
        job_id: &str,
        status: AsyncJobStatus,
        result: Option<serde_json::Value>,
        error: Option<&str>,
    ) -> Result<()> {
        self.store.update_async_job_status(job_id, status, result, error)?;
        Ok(())
    }
}

/// Not cryptographically random — UUIDv7's trailing random bits are plenty
/// of entropy for a dedup-resistant job-id suffix, and it avoids a dependency
/// the rest of the workspace doesn't otherwise need.
fn random_suffix() -> String {
    uuid::Uuid::now_v7().simple().to_string()[20..].to_string()
}

#[allow(dead_code)]
fn default_priority() -> JobPriority {
    JobPriority::Normal
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDispatcher(AtomicUsize);

    #[async_trait]
    impl ContentAgentDispatcher for CountingDispatcher {
        async fn generate_asset(&self, _payload: &GenerateAssetPayload) -> std::result::Result<(), crate::dispatch::DispatchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn store() -> Arc<RowStore> {
        let conn = Connection::open_in_memory().unwrap();
        storyline_store::db::init_db(&conn).unwrap();
        Arc::new(RowStore::new(conn))
    }

    #[tokio::test]
    async fn create_job_seeds_async_job_and_asset_jobs_for_story_generation() {
        let store = store();
        let story = store.create_story("story-1", "user-1", None).unwrap();
        assert_eq!(story.id, "story-1");
        let dispatcher = Arc::new(CountingDispatcher(AtomicUsize::new(0)));
        let manager = JobManager::new(store.clone(), dispatcher.clone());

        let job = manager
            .create_job(
                CreateJobRequest {
                    user_id: "user-1".into(),
                    session_id: "session-1".into(),
                    job_type: AsyncJobType::StoryGeneration,
                    request_data: serde_json::json!({"storyType": "adventure"}),
                    priority: JobPriority::Normal,
                },
                Some("story-1"),
            )
            .await
            .unwrap();

        assert!(job.job_id.starts_with("job_"));
        assert_eq!(job.status, AsyncJobStatus::Pending);
        assert_eq!(dispatcher.0.load(Ordering::SeqCst), 1);

        let jobs = store.list_asset_jobs_for_story("story-1").unwrap();
        assert_eq!(jobs.len(), 9);
    }

    #[tokio::test]
    async fn get_job_status_returns_not_found_for_missing_job() {
        let store = store();
        let dispatcher = Arc::new(CountingDispatcher(AtomicUsize::new(0)));
        let manager = JobManager::new(store, dispatcher);
        assert!(manager.get_job_status("job_missing").is_err());
    }

    #[tokio::test]
    async fn update_job_status_is_idempotent_on_ready() {
        let store = store();
        store
            .create_async_job("job_1", "user-1", "session-1", AsyncJobType::AssetGeneration, serde_json::json!({}))
            .unwrap();
        let dispatcher = Arc::new(CountingDispatcher(AtomicUsize::new(0)));
        let manager = JobManager::new(store.clone(), dispatcher);

        manager
            .update_job_status("job_1", AsyncJobStatus::Ready, Some(serde_json::json!({"url": "a"})), None)
            .unwrap();
        manager.update_job_status("job_1", AsyncJobStatus::Ready, None, None).unwrap();

        let row = manager.get_job_status("job_1").unwrap();
        assert_eq!(row.status, AsyncJobStatus::Ready);
        assert_eq!(row.result_data, Some(serde_json::json!({"url": "a"})));
    }
}
