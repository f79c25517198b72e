use thiserror::Error;

/// Errors surfaced by the continuity manager.
#[derive(Debug, Error)]
pub enum ContinuityError {
    #[error("context not found for session {session_id}")]
    NotFound { session_id: String },

    #[error("store error: {0}")]
    Store(#[from] storyline_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("decrypt failed for session {session_id}")]
    Decrypt { session_id: String },

    #[error("decrypt failed for session {session_id}: no key configured for key id {key_id}")]
    UnknownKeyId { session_id: String, key_id: String },

    #[error("corrupt cache entry: {0}")]
    CorruptEntry(String),

    #[error("device history entry rejected: {0}")]
    InvalidHandoff(String),
}

impl From<ContinuityError> for storyline_core::StorylineError {
    fn from(e: ContinuityError) -> Self {
        match e {
            ContinuityError::Decrypt { .. } | ContinuityError::UnknownKeyId { .. } => {
                storyline_core::StorylineError::DecryptError(e.to_string())
            }
            other => storyline_core::StorylineError::PersistenceError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ContinuityError>;
