use thiserror::Error;

#[derive(Debug, Error)]
pub enum CapabilityError {
    /// Neither screen nor audio is available, or no input method exists
    /// (§4.6 validation rule) — the device can't be served at all.
    #[error("invalid device capability record: {0}")]
    InvalidCapabilities(String),
}

impl From<CapabilityError> for storyline_core::StorylineError {
    fn from(e: CapabilityError) -> Self {
        storyline_core::StorylineError::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CapabilityError>;
