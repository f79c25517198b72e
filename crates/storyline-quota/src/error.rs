use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("row-store error: {0}")]
    Store(#[from] storyline_store::StoreError),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("parental consent required for user {user_id}")]
    ConsentRequired { user_id: String },

    #[error("monthly story limit reached")]
    LimitReached,

    #[error("verification code invalid or expired")]
    InvalidVerificationCode,
}

impl From<QuotaError> for storyline_core::StorylineError {
    fn from(e: QuotaError) -> Self {
        match e {
            QuotaError::ConsentRequired { user_id } => {
                storyline_core::StorylineError::ConsentRequired { user_id }
            }
            QuotaError::LimitReached | QuotaError::InvalidVerificationCode => {
                storyline_core::StorylineError::QuotaExceeded {
                    message: e.to_string(),
                }
            }
            QuotaError::UserNotFound(_) | QuotaError::Store(_) | QuotaError::Cache(_)
            | QuotaError::Serialization(_) => {
                storyline_core::StorylineError::PersistenceError(e.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, QuotaError>;
