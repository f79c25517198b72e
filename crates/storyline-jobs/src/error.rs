use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobsError {
    #[error(transparent)]
    Store(#[from] storyline_store::StoreError),

    #[error("content agent dispatch failed: {0}")]
    Dispatch(String),

    #[error("async job not found: {0}")]
    JobNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<JobsError> for storyline_core::StorylineError {
    fn from(e: JobsError) -> Self {
        match e {
            JobsError::Store(inner) => inner.into(),
            JobsError::Dispatch(msg) => storyline_core::StorylineError::ExternalAgentError(msg),
            JobsError::JobNotFound(id) => {
                storyline_core::StorylineError::Internal(format!("async job not found: {id}"))
            }
            JobsError::Serialization(e) => storyline_core::StorylineError::Internal(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, JobsError>;
