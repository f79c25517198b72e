use thiserror::Error;

/// Stable error taxonomy shared by every component in the pipeline.
///
/// The variant name *is* the stable "error kind" referenced throughout the
/// design: callers map each kind to a canonical, child-safe message template
/// and an HTTP-like status. Provider error strings, stack traces, and
/// moderation category details are never surfaced verbatim — wrap them in
/// `Internal`/`ExternalAgent` and keep the detail out of `code()`.
#[derive(Debug, Error)]
pub enum StorylineError {
    #[error("authentication failed: {0}")]
    Unauthenticated(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("parental consent required for user {user_id}")]
    ConsentRequired { user_id: String },

    #[error("quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("safety screen blocked this turn (severity={severity})")]
    SafetyBlocked { severity: String },

    #[error("intent classification failed: {0}")]
    IntentClassificationFailed(String),

    #[error("external agent error: {0}")]
    ExternalAgentError(String),

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("decrypt error: {0}")]
    DecryptError(String),

    #[error("request timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StorylineError {
    /// Short, stable error code. Never changes across releases — clients and
    /// logs key off this, not the Display string.
    pub fn code(&self) -> &'static str {
        match self {
            StorylineError::Unauthenticated(_) => "unauthenticated",
            StorylineError::Unauthorized(_) => "unauthorized",
            StorylineError::ConsentRequired { .. } => "consent_required",
            StorylineError::QuotaExceeded { .. } => "quota_exceeded",
            StorylineError::SafetyBlocked { .. } => "safety_blocked",
            StorylineError::IntentClassificationFailed(_) => "intent_classification_failed",
            StorylineError::ExternalAgentError(_) => "external_agent_error",
            StorylineError::PersistenceError(_) => "persistence_error",
            StorylineError::DecryptError(_) => "decrypt_error",
            StorylineError::Timeout { .. } => "timeout",
            StorylineError::Config(_) => "internal_error",
            StorylineError::Internal(_) => "internal_error",
        }
    }

    /// Whether this error kind should roll back (not persist) the in-flight
    /// context write for the current turn. Persistence and decrypt failures
    /// are turn-fatal but session-survivable: we must not write a context
    /// built on top of a failed read.
    pub fn rolls_back_context(&self) -> bool {
        matches!(
            self,
            StorylineError::PersistenceError(_)
                | StorylineError::DecryptError(_)
                | StorylineError::Timeout { .. }
        )
    }

    /// HTTP-like status code for the inbound turn API.
    pub fn status(&self) -> u16 {
        match self {
            StorylineError::Unauthenticated(_) => 401,
            StorylineError::Unauthorized(_) => 403,
            StorylineError::ConsentRequired { .. } => 403,
            StorylineError::QuotaExceeded { .. } => 402,
            StorylineError::SafetyBlocked { .. } => 200, // pivoted, not rejected
            StorylineError::IntentClassificationFailed(_) => 200, // falls through to heuristic
            StorylineError::ExternalAgentError(_) => 502,
            StorylineError::PersistenceError(_) => 200, // degraded, not fatal
            StorylineError::DecryptError(_) => 409,
            StorylineError::Timeout { .. } => 503,
            StorylineError::Config(_) => 500,
            StorylineError::Internal(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorylineError>;
