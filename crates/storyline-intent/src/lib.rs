pub mod classifier;
pub mod error;
pub mod heuristics;
pub mod schema;
pub mod types;

pub use classifier::IntentClassifier;
pub use error::{IntentError, Result};
pub use types::{ClassificationSource, ClassifiedIntent, Intent};
