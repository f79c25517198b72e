use thiserror::Error;

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error("provider error: {0}")]
    Provider(#[from] storyline_llm::ProviderError),

    #[error("malformed moderation response: {0}")]
    SchemaMismatch(String),
}

impl From<SafetyError> for storyline_core::StorylineError {
    fn from(e: SafetyError) -> Self {
        storyline_core::StorylineError::ExternalAgentError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SafetyError>;
