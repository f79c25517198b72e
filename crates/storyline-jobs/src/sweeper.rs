use std::sync::Arc;

use chrono::Duration;
use storyline_store::types::AssetJobStatus;
use storyline_store::RowStore;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::types::TimeoutSweeperConfig;

/// Fails asset jobs stuck `generating` past `T_stuck` and recomputes the
/// owning story's overall status (§4.8.3).
pub struct TimeoutSweeper {
    store: Arc<RowStore>,
    config: TimeoutSweeperConfig,
}

impl TimeoutSweeper {
    pub fn new(store: Arc<RowStore>, config: TimeoutSweeperConfig) -> Self {
        Self { store, config }
    }

    /// One sweep: find stuck jobs, mark each `failed` with `error_message =
    /// "timeout"`, then recompute and persist each affected story's overall
    /// status. Retries are intra-call inside the content agent (§4.8.3) — the
    /// sweeper never requeues, it only terminates.
    pub async fn tick(&self) -> Result<usize> {
        let cutoff = (chrono::Utc::now() - Duration::minutes(self.config.stuck_after_minutes)).to_rfc3339();
        let stuck = self.store.find_stuck_asset_jobs(&cutoff)?;

        let mut affected_stories = std::collections::HashSet::new();
        for job in &stuck {
            warn!(job_id = %job.id, story_id = %job.story_id, asset_type = %job.asset_type, "asset job timed out");
            self.store.update_asset_job_status(&job.id, AssetJobStatus::Failed, Some("timeout"))?;
            affected_stories.insert(job.story_id.clone());
        }

        for story_id in &affected_stories {
            self.recompute_story_status(story_id)?;
        }

        Ok(stuck.len())
    }

    fn recompute_story_status(&self, story_id: &str) -> Result<()> {
        let story = self.store.get_story(story_id)?;
        let jobs = self.store.list_asset_jobs_for_story(story_id)?;

        let mut status = story.asset_generation_status;
        for job in jobs {
            if let Some(entry) = status.assets.get_mut(&job.asset_type) {
                entry.status = job.status;
                entry.completed_at = job.completed_at;
            }
        }
        status.recompute_overall();
        self.store.save_asset_generation_status(story_id, &status)?;
        Ok(())
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(tick_secs = self.config.tick_interval_secs, stuck_after_minutes = self.config.stuck_after_minutes, "timeout sweeper started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(self.config.tick_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(n) if n > 0 => info!(count = n, "timeout sweeper failed stuck jobs"),
                        Ok(_) => {}
                        Err(e) => error!("timeout sweeper tick error: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("timeout sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use storyline_store::types::{AssetOverallStatus, AssetType, JobPriority};

    fn store_with_story() -> Arc<RowStore> {
        let conn = Connection::open_in_memory().unwrap();
        storyline_store::db::init_db(&conn).unwrap();
        let store = Arc::new(RowStore::new(conn));
        store.create_story("story-1", "user-1", None).unwrap();
        store.create_asset_jobs("story-1", JobPriority::Normal).unwrap();
        store
    }

    #[tokio::test]
    async fn tick_fails_stuck_jobs_and_marks_story_failed() {
        let store = store_with_story();
        // Lease every queued job so it (and the already-generating content
        // job) sits at status=generating, started_at=now.
        store.lease_queued_asset_jobs(100).unwrap();
        // A negative window puts the cutoff in the future, so "started_at=now"
        // reads as stuck without needing to fabricate a timestamp directly.
        let sweeper = TimeoutSweeper::new(store.clone(), TimeoutSweeperConfig { stuck_after_minutes: -1, tick_interval_secs: 60 });

        let n = sweeper.tick().await.unwrap();
        assert_eq!(n, 9);

        let jobs = store.list_asset_jobs_for_story("story-1").unwrap();
        assert!(jobs.iter().all(|j| j.status == AssetJobStatus::Failed));
        assert!(jobs.iter().all(|j| j.error_message.as_deref() == Some("timeout")));

        let story = store.get_story("story-1").unwrap();
        assert_eq!(story.asset_generation_status.overall, AssetOverallStatus::Failed);
    }

    #[tokio::test]
    async fn tick_ignores_jobs_within_the_timeout_window() {
        let store = store_with_story();
        store.lease_queued_asset_jobs(100).unwrap();
        let sweeper = TimeoutSweeper::new(store.clone(), TimeoutSweeperConfig { stuck_after_minutes: 15, tick_interval_secs: 60 });
        let n = sweeper.tick().await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn partial_failure_recomputes_to_partial_overall() {
        let store = store_with_story();
        let jobs = store.list_asset_jobs_for_story("story-1").unwrap();
        // Ready every asset except content, which stays generating from creation.
        for job in &jobs {
            if job.asset_type != AssetType::Content {
                store.update_asset_job_status(&job.id, AssetJobStatus::Ready, None).unwrap();
            }
        }
        let mut status = store.get_story("story-1").unwrap().asset_generation_status;
        for job in &jobs {
            if job.asset_type != AssetType::Content {
                if let Some(entry) = status.assets.get_mut(&job.asset_type) {
                    entry.status = AssetJobStatus::Ready;
                }
            }
        }
        store.save_asset_generation_status("story-1", &status).unwrap();

        let sweeper = TimeoutSweeper::new(store.clone(), TimeoutSweeperConfig { stuck_after_minutes: -1, tick_interval_secs: 60 });
        let n = sweeper.tick().await.unwrap();
        assert_eq!(n, 1);

        let story = store.get_story("story-1").unwrap();
        assert_eq!(story.asset_generation_status.overall, AssetOverallStatus::Partial);
    }
}
