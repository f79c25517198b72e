pub mod crisis;
pub mod error;
pub mod keyword_gate;
pub mod llm_gate;
pub mod moderator;
pub mod types;

pub use crisis::{crisis_resources, trigger_crisis_intervention};
pub use error::{Result, SafetyError};
pub use moderator::SafetyModerator;
pub use types::{SafetyCategory, SafetyVerdict, Severity};
