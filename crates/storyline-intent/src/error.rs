use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("provider error: {0}")]
    Provider(#[from] storyline_llm::ProviderError),

    #[error("malformed function-call response: {0}")]
    SchemaMismatch(String),
}

impl From<IntentError> for storyline_core::StorylineError {
    fn from(e: IntentError) -> Self {
        storyline_core::StorylineError::IntentClassificationFailed(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IntentError>;
