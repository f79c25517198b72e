use regex::Regex;
use storyline_core::types::{ConversationPhase, StoryType};

use crate::types::{ClassificationSource, ClassifiedIntent, Intent};

/// Keyword-driven fallback used when the LLM classifier is unavailable or
/// returns a malformed response (§4.3 `handleUnrecognizedIntent`). Checked
/// in order: a household switching who the story is for takes priority over
/// everything else, then a bare story keyword, then the current phase,
/// then give up.
pub struct HeuristicClassifier {
    switch_patterns: Vec<Regex>,
    story_keywords: Regex,
}

impl HeuristicClassifier {
    pub fn new() -> Self {
        let patterns = [
            r"(?i)\bmake (?:one|it) for (\w+)\b",
            r"(?i)\bthis is for (\w+)\b",
            r"(?i)\b(\w+)'s turn\b",
            r"(?i)\bswitch to (\w+)\b",
            r"(?i)\blet (\w+) play\b",
            r"(?i)\b(\w+) wants to\b",
            r"(?i)\bfor (\w+)\b",
        ];
        Self {
            switch_patterns: patterns.iter().map(|p| Regex::new(p).unwrap()).collect(),
            story_keywords: Regex::new(
                r"(?i)\b(story|tale|adventure|character|princess|knight|create|generate)\b",
            )
            .unwrap(),
        }
    }

    pub fn classify(&self, utterance: &str, phase: ConversationPhase) -> ClassifiedIntent {
        if let Some(child_name) = self.detect_child_switch(utterance) {
            return ClassifiedIntent {
                intent: Intent::Unknown,
                confidence: 0.9,
                suggested_story_type: suggest_story_type(utterance),
                suggested_phase: None,
                entities: serde_json::json!({ "action": "switch_child", "child_name": child_name }),
                source: ClassificationSource::Heuristic,
            };
        }

        if self.story_keywords.is_match(utterance) {
            return ClassifiedIntent {
                intent: Intent::CreateStory,
                confidence: 0.2,
                suggested_story_type: suggest_story_type(utterance),
                suggested_phase: Some(ConversationPhase::CharacterCreation),
                entities: serde_json::json!({}),
                source: ClassificationSource::Heuristic,
            };
        }

        let (intent, confidence) = match phase {
            ConversationPhase::CharacterCreation => (Intent::CreateCharacter, 0.2),
            ConversationPhase::StoryBuilding => (Intent::ContinueStory, 0.2),
            _ => (Intent::Unknown, 0.2),
        };

        ClassifiedIntent {
            intent,
            confidence,
            suggested_story_type: suggest_story_type(utterance),
            suggested_phase: None,
            entities: serde_json::json!({}),
            source: ClassificationSource::Heuristic,
        }
    }

    fn detect_child_switch(&self, utterance: &str) -> Option<String> {
        self.switch_patterns
            .iter()
            .find_map(|p| p.captures(utterance))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn suggest_story_type(utterance: &str) -> Option<StoryType> {
    let lower = utterance.to_lowercase();
    let pairs: &[(&str, StoryType)] = &[
        ("bedtime", StoryType::Bedtime),
        ("birthday", StoryType::Birthday),
        ("adventure", StoryType::Adventure),
        ("learn", StoryType::Educational),
        ("money", StoryType::FinancialLiteracy),
        ("language", StoryType::LanguageLearning),
        ("hospital", StoryType::MedicalBravery),
        ("brave", StoryType::MedicalBravery),
        ("feelings", StoryType::MentalHealth),
        ("milestone", StoryType::Milestones),
        ("music", StoryType::Music),
        ("new baby", StoryType::NewBirth),
        ("sibling", StoryType::NewBirth),
        ("screen time", StoryType::TechReadiness),
        ("loss", StoryType::ChildLoss),
        ("grief", StoryType::ChildLoss),
    ];
    pairs.iter().find(|(kw, _)| lower.contains(kw)).map(|(_, t)| *t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_switch_child_from_make_one_for_phrase() {
        let c = HeuristicClassifier::new();
        let result = c.classify("make one for Lily instead", ConversationPhase::Greeting);
        assert_eq!(result.intent, Intent::Unknown);
        assert_eq!(result.entities["action"], "switch_child");
        assert_eq!(result.entities["child_name"], "Lily");
    }

    #[test]
    fn detects_switch_child_from_possessive_turn_phrase() {
        let c = HeuristicClassifier::new();
        let result = c.classify("okay, Noah's turn now", ConversationPhase::StoryBuilding);
        assert_eq!(result.entities["child_name"], "Noah");
        assert!(result.confidence > 0.8);
    }

    #[test]
    fn story_keyword_suggests_character_creation_phase() {
        let c = HeuristicClassifier::new();
        let result = c.classify("let's make an adventure story", ConversationPhase::Greeting);
        assert_eq!(result.intent, Intent::CreateStory);
        assert_eq!(result.suggested_phase, Some(ConversationPhase::CharacterCreation));
    }

    #[test]
    fn falls_through_to_continue_in_story_building_phase() {
        let c = HeuristicClassifier::new();
        let result = c.classify("she has green eyes and a red cape", ConversationPhase::StoryBuilding);
        assert_eq!(result.intent, Intent::ContinueStory);
    }

    #[test]
    fn falls_through_to_create_character_in_character_creation_phase() {
        let c = HeuristicClassifier::new();
        let result = c.classify("he's pretty tall", ConversationPhase::CharacterCreation);
        assert_eq!(result.intent, Intent::CreateCharacter);
    }

    #[test]
    fn unmatched_outside_active_phase_is_unknown() {
        let c = HeuristicClassifier::new();
        let result = c.classify("xyzzy plugh", ConversationPhase::Greeting);
        assert_eq!(result.intent, Intent::Unknown);
    }

    #[test]
    fn suggests_bedtime_story_type() {
        let c = HeuristicClassifier::new();
        let result = c.classify("tell me a bedtime story", ConversationPhase::Greeting);
        assert_eq!(result.suggested_story_type, Some(StoryType::Bedtime));
    }
}
