use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Crisis,
}

impl Severity {
    pub fn blocks_turn(self) -> bool {
        self >= Severity::High
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCategory {
    SelfHarm,
    Violence,
    SexualContent,
    Substances,
    HateSpeech,
    PersonalInfo,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub severity: Severity,
    pub category: SafetyCategory,
    pub triggered_by: Vec<String>,
    pub requires_crisis_intervention: bool,
}

impl SafetyVerdict {
    pub fn clear() -> Self {
        Self {
            severity: Severity::None,
            category: SafetyCategory::None,
            triggered_by: Vec::new(),
            requires_crisis_intervention: false,
        }
    }
}

/// A fixed crisis-support resource surfaced verbatim when the crisis gate
/// trips — never generated by the LLM (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrisisResource {
    pub name: String,
    pub phone: String,
    pub sms: Option<String>,
    pub description: String,
}
