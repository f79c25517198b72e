use regex::Regex;

use crate::types::{SafetyCategory, SafetyVerdict, Severity};

/// Fast, deterministic first pass over every inbound utterance (§4.4). Runs
/// before the LLM moderation call so a crisis phrase is never gated behind
/// provider latency or an outage. Word families are grouped, not exhaustive —
/// the LLM gate catches what regex can't.
pub struct KeywordGate {
    crisis: Regex,
    self_harm: Regex,
    violence: Regex,
    substances: Regex,
}

impl KeywordGate {
    pub fn new() -> Self {
        Self {
            crisis: Regex::new(
                r"(?i)\b(kill myself|want to die|end my life|suicide|hurt myself|not worth living)\b",
            )
            .unwrap(),
            self_harm: Regex::new(r"(?i)\b(cutting|self[- ]harm|starve myself)\b").unwrap(),
            violence: Regex::new(r"(?i)\b(kill (you|him|her|them)|hurt (you|him|her|them)|gun|knife (attack|fight))\b").unwrap(),
            substances: Regex::new(r"(?i)\b(drugs|overdose|get high|alcohol poisoning)\b").unwrap(),
        }
    }

    pub fn scan(&self, text: &str) -> SafetyVerdict {
        if let Some(m) = self.crisis.find(text) {
            return SafetyVerdict {
                severity: Severity::Crisis,
                category: SafetyCategory::SelfHarm,
                triggered_by: vec![m.as_str().to_string()],
                requires_crisis_intervention: true,
            };
        }
        if let Some(m) = self.self_harm.find(text) {
            return SafetyVerdict {
                severity: Severity::High,
                category: SafetyCategory::SelfHarm,
                triggered_by: vec![m.as_str().to_string()],
                requires_crisis_intervention: false,
            };
        }
        if let Some(m) = self.violence.find(text) {
            return SafetyVerdict {
                severity: Severity::Medium,
                category: SafetyCategory::Violence,
                triggered_by: vec![m.as_str().to_string()],
                requires_crisis_intervention: false,
            };
        }
        if let Some(m) = self.substances.find(text) {
            return SafetyVerdict {
                severity: Severity::Medium,
                category: SafetyCategory::Substances,
                triggered_by: vec![m.as_str().to_string()],
                requires_crisis_intervention: false,
            };
        }
        SafetyVerdict::clear()
    }
}

impl Default for KeywordGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crisis_phrase_triggers_intervention() {
        let gate = KeywordGate::new();
        let verdict = gate.scan("I just want to end my life");
        assert_eq!(verdict.severity, Severity::Crisis);
        assert!(verdict.requires_crisis_intervention);
    }

    #[test]
    fn clean_text_passes() {
        let gate = KeywordGate::new();
        let verdict = gate.scan("can we make the dragon purple instead");
        assert_eq!(verdict.severity, Severity::None);
    }

    #[test]
    fn violence_keyword_is_medium_not_crisis() {
        let gate = KeywordGate::new();
        let verdict = gate.scan("the knight wants to hurt him in the story");
        assert_eq!(verdict.severity, Severity::Medium);
        assert!(!verdict.requires_crisis_intervention);
    }
}
