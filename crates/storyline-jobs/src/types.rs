use serde::{Deserialize, Serialize};

pub use storyline_store::types::{
    AssetEntry, AssetGenerationStatus, AssetJobRow, AssetJobStatus, AssetOverallStatus,
    AssetType, AsyncJobRow, AsyncJobStatus, AsyncJobType, JobPriority, StoryRow,
};

/// `createJob` request body (§4.8.1). `story_generation` seeds the full
/// `AssetType::REQUIRED` fan-out; `asset_generation` targets a single
/// already-existing story (e.g. a retry triggered outside the worker).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub user_id: String,
    pub session_id: String,
    pub job_type: AsyncJobType,
    pub request_data: serde_json::Value,
    #[serde(default)]
    pub priority: JobPriority,
}

/// Outbound RPC payload fired at the content agent for one asset (§4.8.1, §4.8.2).
/// `reference_cover_only` encodes the beat reference-isolation rule: a beat
/// image prompt may cite the cover, never another beat (§4.8.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateAssetPayload {
    pub action: &'static str,
    pub story_id: String,
    pub asset_type: AssetType,
    pub job_id: String,
    pub user_id: String,
    pub story: serde_json::Value,
    pub reference_cover_only: bool,
}

impl GenerateAssetPayload {
    pub fn new(story_id: &str, asset_type: AssetType, job_id: &str, user_id: &str, story: serde_json::Value) -> Self {
        Self {
            action: "generate_asset",
            story_id: story_id.to_string(),
            asset_type,
            job_id: job_id.to_string(),
            user_id: user_id.to_string(),
            story,
            reference_cover_only: asset_type.is_beat(),
        }
    }

    /// Change-stream topic consumers subscribe to for this story (§4.8.2, §6).
    pub fn change_stream_topic(story_id: &str) -> String {
        format!("stories:id={story_id}")
    }
}

/// Asset Worker tick configuration. Defaults match §4.8.2.
#[derive(Debug, Clone, Copy)]
pub struct AssetWorkerConfig {
    pub batch_size: usize,
    pub tick_interval_secs: u64,
}

impl Default for AssetWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            tick_interval_secs: 5,
        }
    }
}

/// Timeout Sweeper configuration. Defaults match §4.8.3 (`T_stuck` = 15 minutes).
#[derive(Debug, Clone, Copy)]
pub struct TimeoutSweeperConfig {
    pub stuck_after_minutes: i64,
    pub tick_interval_secs: u64,
}

impl Default for TimeoutSweeperConfig {
    fn default() -> Self {
        Self {
            stuck_after_minutes: 15,
            tick_interval_secs: 60,
        }
    }
}

/// `job_<unix_ms>_<random>` (§4.8.1). Takes the current time explicitly so
/// callers stay in control of the clock source (tests pass a fixed instant).
pub fn generate_job_id(now_unix_ms: i64, random_suffix: &str) -> String {
    format!("job_{now_unix_ms}_{random_suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_matches_expected_shape() {
        let id = generate_job_id(1_700_000_000_000, "a1b2c3");
        assert_eq!(id, "job_1700000000000_a1b2c3");
    }

    #[test]
    fn beat_asset_is_cover_referenced_only() {
        let payload = GenerateAssetPayload::new("story-1", AssetType::Scene2, "job-1", "user-1", serde_json::json!({}));
        assert!(payload.reference_cover_only);
        let cover_payload = GenerateAssetPayload::new("story-1", AssetType::Cover, "job-1", "user-1", serde_json::json!({}));
        assert!(!cover_payload.reference_cover_only);
    }

    #[test]
    fn change_stream_topic_is_story_scoped() {
        assert_eq!(GenerateAssetPayload::change_stream_topic("abc"), "stories:id=abc");
    }
}
