use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One deliverable produced for a story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Content,
    Cover,
    Scene1,
    Scene2,
    Scene3,
    Scene4,
    Audio,
    Activities,
    Pdf,
}

impl AssetType {
    /// The fixed set of assets created per `createJob` for `story_generation` (§4.8.1).
    /// Nine entries, matching the enumerated list in §3/§4.8.1 — a separate
    /// walkthrough elsewhere describes an 8-row result, which undercounts
    /// this list by one; the enumerated set wins.
    pub const REQUIRED: [AssetType; 9] = [
        AssetType::Content,
        AssetType::Cover,
        AssetType::Scene1,
        AssetType::Scene2,
        AssetType::Scene3,
        AssetType::Scene4,
        AssetType::Audio,
        AssetType::Activities,
        AssetType::Pdf,
    ];

    /// Retry budget before an asset job is marked permanently failed (§4.8.3).
    pub fn max_retries(self) -> u32 {
        match self {
            AssetType::Cover => 2,
            AssetType::Scene1 | AssetType::Scene2 | AssetType::Scene3 | AssetType::Scene4 => 1,
            _ => 0,
        }
    }

    /// Beat jobs only ever reference the cover image, never prior beats (§4.8.3).
    pub fn is_beat(self) -> bool {
        matches!(
            self,
            AssetType::Scene1 | AssetType::Scene2 | AssetType::Scene3 | AssetType::Scene4
        )
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssetType::Content => "content",
            AssetType::Cover => "cover",
            AssetType::Scene1 => "scene_1",
            AssetType::Scene2 => "scene_2",
            AssetType::Scene3 => "scene_3",
            AssetType::Scene4 => "scene_4",
            AssetType::Audio => "audio",
            AssetType::Activities => "activities",
            AssetType::Pdf => "pdf",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AssetType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(AssetType::Content),
            "cover" => Ok(AssetType::Cover),
            "scene_1" => Ok(AssetType::Scene1),
            "scene_2" => Ok(AssetType::Scene2),
            "scene_3" => Ok(AssetType::Scene3),
            "scene_4" => Ok(AssetType::Scene4),
            "audio" => Ok(AssetType::Audio),
            "activities" => Ok(AssetType::Activities),
            "pdf" => Ok(AssetType::Pdf),
            other => Err(format!("unknown asset type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetJobStatus {
    Queued,
    Generating,
    Ready,
    Failed,
}

impl std::fmt::Display for AssetJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssetJobStatus::Queued => "queued",
            AssetJobStatus::Generating => "generating",
            AssetJobStatus::Ready => "ready",
            AssetJobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AssetJobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(AssetJobStatus::Queued),
            "generating" => Ok(AssetJobStatus::Generating),
            "ready" => Ok(AssetJobStatus::Ready),
            "failed" => Ok(AssetJobStatus::Failed),
            other => Err(format!("unknown asset job status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Normal,
    High,
    Urgent,
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

impl JobPriority {
    /// Sort weight for `ORDER BY priority desc` (§4.8.2).
    pub fn weight(self) -> i64 {
        match self {
            JobPriority::Normal => 0,
            JobPriority::High => 1,
            JobPriority::Urgent => 2,
        }
    }
}

impl std::fmt::Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobPriority::Normal => "normal",
            JobPriority::High => "high",
            JobPriority::Urgent => "urgent",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobPriority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(JobPriority::Normal),
            "high" => Ok(JobPriority::High),
            "urgent" => Ok(JobPriority::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// A single persisted asset-generation job (§3 `AssetJob`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetJobRow {
    pub id: String,
    pub story_id: String,
    pub asset_type: AssetType,
    pub status: AssetJobStatus,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub retry_count: u32,
    pub priority: JobPriority,
    pub error_message: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncJobType {
    StoryGeneration,
    AssetGeneration,
}

impl std::fmt::Display for AsyncJobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AsyncJobType::StoryGeneration => "story_generation",
            AsyncJobType::AssetGeneration => "asset_generation",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AsyncJobType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "story_generation" => Ok(AsyncJobType::StoryGeneration),
            "asset_generation" => Ok(AsyncJobType::AssetGeneration),
            other => Err(format!("unknown job type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsyncJobStatus {
    Pending,
    Queued,
    Processing,
    Ready,
    Failed,
}

impl std::fmt::Display for AsyncJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AsyncJobStatus::Pending => "pending",
            AsyncJobStatus::Queued => "queued",
            AsyncJobStatus::Processing => "processing",
            AsyncJobStatus::Ready => "ready",
            AsyncJobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AsyncJobStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AsyncJobStatus::Pending),
            "queued" => Ok(AsyncJobStatus::Queued),
            "processing" => Ok(AsyncJobStatus::Processing),
            "ready" => Ok(AsyncJobStatus::Ready),
            "failed" => Ok(AsyncJobStatus::Failed),
            other => Err(format!("unknown async job status: {other}")),
        }
    }
}

/// §3 `AsyncJob` — the synchronous handle returned to the caller of a
/// long-running request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncJobRow {
    pub job_id: String,
    pub user_id: String,
    pub session_id: String,
    pub job_type: AsyncJobType,
    pub status: AsyncJobStatus,
    pub request_data: serde_json::Value,
    pub result_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetOverallStatus {
    Generating,
    Ready,
    Failed,
    Partial,
}

impl std::fmt::Display for AssetOverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AssetOverallStatus::Generating => "generating",
            AssetOverallStatus::Ready => "ready",
            AssetOverallStatus::Failed => "failed",
            AssetOverallStatus::Partial => "partial",
        };
        write!(f, "{s}")
    }
}

/// A single asset's progressive status, as tracked in the story's JSON blob (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetEntry {
    pub status: AssetJobStatus,
    pub url: Option<String>,
    pub data: Option<String>,
    pub progress: u8,
    pub completed_at: Option<String>,
}

impl AssetEntry {
    pub fn queued() -> Self {
        Self {
            status: AssetJobStatus::Queued,
            url: None,
            data: None,
            progress: 0,
            completed_at: None,
        }
    }

    pub fn generating() -> Self {
        Self {
            status: AssetJobStatus::Generating,
            url: None,
            data: None,
            progress: 0,
            completed_at: None,
        }
    }
}

/// One JSON blob stored on the story row, tracking every expected asset (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetGenerationStatus {
    pub overall: AssetOverallStatus,
    pub assets: HashMap<AssetType, AssetEntry>,
}

impl AssetGenerationStatus {
    /// Seed status for a freshly created story: content starts `generating`
    /// (the content agent claims it first), everything else is `queued` (§4.8.1).
    pub fn initial() -> Self {
        let mut assets = HashMap::new();
        for asset_type in AssetType::REQUIRED {
            let entry = if asset_type == AssetType::Content {
                AssetEntry::generating()
            } else {
                AssetEntry::queued()
            };
            assets.insert(asset_type, entry);
        }
        Self {
            overall: AssetOverallStatus::Generating,
            assets,
        }
    }

    /// Recompute `overall` from the per-asset statuses per the §3 invariant.
    /// Pure — callers are responsible for persisting the result inside a
    /// row-level transaction (§5).
    pub fn recompute_overall(&mut self) {
        let total = self.assets.len();
        let ready = self
            .assets
            .values()
            .filter(|e| e.status == AssetJobStatus::Ready)
            .count();
        let failed = self
            .assets
            .values()
            .filter(|e| e.status == AssetJobStatus::Failed)
            .count();
        let generating = self
            .assets
            .values()
            .filter(|e| e.status == AssetJobStatus::Generating || e.status == AssetJobStatus::Queued)
            .count();

        self.overall = if ready == total {
            AssetOverallStatus::Ready
        } else if failed == total {
            AssetOverallStatus::Failed
        } else if ready > 0 && failed > 0 && generating == 0 {
            AssetOverallStatus::Partial
        } else {
            AssetOverallStatus::Generating
        };
    }
}

/// `stories` row (§6, abbreviated to the columns the core touches).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryRow {
    pub id: String,
    pub creator_user_id: String,
    pub library_id: Option<String>,
    pub status: String,
    pub asset_generation_status: AssetGenerationStatus,
    pub asset_generation_started_at: Option<String>,
    pub asset_generation_completed_at: Option<String>,
    pub hue_extracted_colors: Option<serde_json::Value>,
    pub audio_words: Option<serde_json::Value>,
    pub audio_blocks: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

/// `conversation_sessions` durable row — written only from `character_creation`
/// phase onward (§4.2), used for cross-region session recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSessionRow {
    pub session_id: String,
    pub user_id: String,
    pub parent_session_id: Option<String>,
    pub conversation_phase: String,
    pub story_id: Option<String>,
    pub character_id: Option<String>,
    pub story_type: Option<String>,
    pub session_chain: serde_json::Value,
    pub device_history: serde_json::Value,
    pub story_state: serde_json::Value,
    pub interruption_state: Option<serde_json::Value>,
    pub user_context: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
    pub expires_at: String,
}

/// `users` row — the subset the quota gate, consent gate, and capability
/// adaptor need (§6). Full profile/personalisation fields live in the
/// downstream user-profile service, out of scope here (§1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub age: Option<u32>,
    pub parent_phone: Option<String>,
    pub test_mode_authorized: bool,
    pub smart_home_connected: bool,
    pub tier: String,
    pub monthly_story_count: u32,
    pub monthly_reset_period: String,
    pub has_created_first_story: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRow {
    pub user_id: String,
    pub plan_id: String,
    pub status: String,
    pub current_period_start: String,
    pub current_period_end: String,
}

/// `invitations` row — all referral-optional fields are nullable (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationRow {
    pub id: String,
    pub inviter_user_id: String,
    pub invitee_phone_or_email: String,
    pub organization_id: Option<String>,
    pub role: Option<String>,
    pub token: Option<String>,
    pub library_id: Option<String>,
    pub expires_at: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartHomeDeviceRow {
    pub id: String,
    pub user_id: String,
    pub device_type: String,
    pub room_id: Option<String>,
    pub connection_status: String,
    pub device_metadata: serde_json::Value,
    pub last_used_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRegistrationRow {
    pub id: String,
    pub platform: String,
    pub target_url: String,
    pub created_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_ready_iff_all_assets_ready() {
        let mut status = AssetGenerationStatus::initial();
        for entry in status.assets.values_mut() {
            entry.status = AssetJobStatus::Ready;
            entry.url = Some("https://cdn.example/x".into());
        }
        status.recompute_overall();
        assert_eq!(status.overall, AssetOverallStatus::Ready);
    }

    #[test]
    fn overall_partial_when_one_ready_one_failed_none_generating() {
        let mut status = AssetGenerationStatus::initial();
        let mut iter = status.assets.values_mut();
        iter.next().unwrap().status = AssetJobStatus::Ready;
        iter.next().unwrap().status = AssetJobStatus::Failed;
        for rest in iter {
            rest.status = AssetJobStatus::Ready;
        }
        // Force exactly one failed among otherwise-ready assets.
        let failed_count = status
            .assets
            .values()
            .filter(|e| e.status == AssetJobStatus::Failed)
            .count();
        assert_eq!(failed_count, 1);
        status.recompute_overall();
        assert_eq!(status.overall, AssetOverallStatus::Partial);
    }

    #[test]
    fn overall_failed_iff_all_failed() {
        let mut status = AssetGenerationStatus::initial();
        for entry in status.assets.values_mut() {
            entry.status = AssetJobStatus::Failed;
        }
        status.recompute_overall();
        assert_eq!(status.overall, AssetOverallStatus::Failed);
    }

    #[test]
    fn asset_type_display_roundtrip() {
        for t in AssetType::REQUIRED {
            assert_eq!(t.to_string().parse::<AssetType>().unwrap(), t);
        }
    }

    #[test]
    fn beat_retry_budget_is_one_cover_is_two() {
        assert_eq!(AssetType::Cover.max_retries(), 2);
        assert_eq!(AssetType::Scene1.max_retries(), 1);
        assert_eq!(AssetType::Audio.max_retries(), 0);
    }
}
