use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Protocol/process constants.
pub const DEFAULT_PORT: u16 = 18080;
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Hard per-turn budget (§5): on exhaustion the orchestrator returns
/// `timeout` and the session context is *not* written.
pub const TURN_BUDGET_MS: u64 = 25_000;
/// A client disconnect past this multiple forcibly cuts the in-flight turn.
pub const TURN_BUDGET_HARD_CUT_MULTIPLIER: u64 = 2;

pub const MODERATION_DEADLINE_MS: u64 = 2_000;
pub const CLASSIFICATION_DEADLINE_MS: u64 = 5_000;
pub const CACHE_DEADLINE_MS: u64 = 500;
pub const ROW_STORE_DEADLINE_MS: u64 = 2_000;
pub const EXTERNAL_AGENT_SYNC_DEADLINE_MS: u64 = 10_000;

/// Default compression threshold for continuity snapshots (T_compress, §4.2).
pub const DEFAULT_COMPRESS_THRESHOLD_BYTES: usize = 2 * 1024;
/// Bounded tail length for `conversationHistory` (H_max, §3).
pub const DEFAULT_HISTORY_MAX: usize = 20;
/// Bounded length for `deviceHistory` (§3 invariant).
pub const DEVICE_HISTORY_MAX: usize = 10;

/// Default asset-job timeout before the sweeper reclaims it (T_stuck, §4.8.3).
pub const DEFAULT_STUCK_JOB_MINUTES: i64 = 15;

/// Top-level config (storyline.toml + STORYLINE_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorylineConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub sms: SmsConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
}

impl Default for StorylineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                port: DEFAULT_PORT,
                bind: DEFAULT_BIND.to_string(),
                auth_token: Some("change-me".to_string()),
            },
            database: DatabaseConfig::default(),
            providers: ProvidersConfig::default(),
            scheduler: SchedulerConfig::default(),
            encryption: EncryptionConfig::default(),
            sms: SmsConfig::default(),
            webhooks: WebhooksConfig::default(),
            agents: AgentsConfig::default(),
        }
    }
}

/// RPC coordinates for the downstream agents dispatch targets (§4.7 step 8).
/// The agents themselves are out of scope (§1); `None` here means the
/// orchestrator falls back to its canned no-op responders.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentsConfig {
    pub content_agent_url: Option<String>,
    pub sync_agent_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token accepted by the inbound turn API's authn step.
    /// `None` disables the sync bearer check (tests / local dev only).
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// LLM provider endpoints consumed by the intent classifier and safety
/// moderator. The providers themselves are out of scope (§1) — these are
/// just connection coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub classifier: LlmEndpointConfig,
    pub moderation: LlmEndpointConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            classifier: LlmEndpointConfig {
                base_url: "https://api.anthropic.com".to_string(),
                api_key: String::new(),
                model: "claude-sonnet-4-6".to_string(),
            },
            moderation: LlmEndpointConfig {
                base_url: "https://api.openai.com".to_string(),
                api_key: String::new(),
                model: "omni-moderation-latest".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEndpointConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_worker_tick_secs")]
    pub worker_tick_secs: u64,
    #[serde(default = "default_timeout_sweep_secs")]
    pub timeout_sweep_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub continuity_cleanup_secs: u64,
    #[serde(default = "default_worker_batch")]
    pub worker_batch_size: usize,
    #[serde(default = "default_stuck_minutes")]
    pub stuck_job_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_tick_secs: default_worker_tick_secs(),
            timeout_sweep_secs: default_timeout_sweep_secs(),
            continuity_cleanup_secs: default_cleanup_interval_secs(),
            worker_batch_size: default_worker_batch(),
            stuck_job_minutes: default_stuck_minutes(),
        }
    }
}

/// Symmetric encryption keys for continuity snapshots, keyed by `keyId` so
/// old keys remain available for decryption after rotation (§5).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub keys: Vec<EncryptionKeyConfig>,
    /// `keyId` used to encrypt new snapshots. Must be present in `keys`.
    pub active_key_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionKeyConfig {
    pub key_id: String,
    /// 32-byte AES-256-GCM key, hex-encoded.
    pub key_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SmsConfig {
    pub provider_base_url: Option<String>,
    pub provider_api_key: Option<String>,
    pub from_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub sources: Vec<WebhookSourceConfig>,
}

/// Per-platform webhook secret — validated only when configured (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSourceConfig {
    /// e.g. "alexa", "google", "smart_home".
    pub platform: String,
    pub secret: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.storyline/storyline.db", home)
}
fn default_worker_tick_secs() -> u64 {
    5 * 60
}
fn default_timeout_sweep_secs() -> u64 {
    15 * 60
}
fn default_cleanup_interval_secs() -> u64 {
    5 * 60
}
fn default_worker_batch() -> usize {
    10
}
fn default_stuck_minutes() -> i64 {
    DEFAULT_STUCK_JOB_MINUTES
}

impl StorylineConfig {
    /// Load config from a TOML file with `STORYLINE_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, then `~/.storyline/storyline.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: StorylineConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("STORYLINE_").split("__"))
            .extract()
            .map_err(|e| crate::error::StorylineError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.storyline/storyline.toml", home)
}
