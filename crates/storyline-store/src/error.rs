use thiserror::Error;

/// Errors surfaced by the KV cache and row-store adapters.
///
/// Every variant maps onto the stable kind the rest of the system expects
/// (`storyline_core::StorylineError::PersistenceError`) so callers don't have
/// to hand-build that mapping at every call site.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache error: {0}")]
    Cache(String),

    #[error("row-store error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("row not found: {table} {key}")]
    NotFound { table: String, key: String },
}

impl From<StoreError> for storyline_core::StorylineError {
    fn from(e: StoreError) -> Self {
        storyline_core::StorylineError::PersistenceError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
