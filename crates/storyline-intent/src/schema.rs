use storyline_llm::ToolDefinition;

use crate::error::{IntentError, Result};
use crate::types::{ClassificationSource, ClassifiedIntent, Intent};

/// The function-call tool we force the classifier model to invoke, so its
/// output is a validated object instead of free text we'd have to parse
/// out of prose (§4.3).
pub fn classify_intent_tool() -> ToolDefinition {
    ToolDefinition {
        name: "classify_intent".to_string(),
        description: "Classify the caregiver's utterance into one of the supported intents."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "intent": {
                    "type": "string",
                    "enum": [
                        "greeting", "create_story", "continue_story", "edit_story", "finish_story",
                        "create_character", "edit_character", "confirm_character",
                        "view_library", "share_story", "delete_story",
                        "emotion_checkin", "mood_update",
                        "subscription_management",
                        "connect_hue", "hue_status", "control_lights",
                        "start_conversation", "continue_conversation", "end_conversation",
                        "resume_conversation", "account_linking", "unknown"
                    ]
                },
                "confidence": { "type": "number", "minimum": 0.0, "maximum": 1.0 },
                "suggested_story_type": { "type": ["string", "null"] },
                "conversation_phase": { "type": ["string", "null"] },
                "entities": { "type": "object" }
            },
            "required": ["intent", "confidence"]
        }),
    }
}

/// Validate and convert the model's raw tool-call input into a
/// `ClassifiedIntent`. Any shape deviation is a hard error — callers should
/// fall back to the heuristic classifier rather than trust a guess.
pub fn parse_tool_output(input: &serde_json::Value) -> Result<ClassifiedIntent> {
    let intent_str = input
        .get("intent")
        .and_then(|v| v.as_str())
        .ok_or_else(|| IntentError::SchemaMismatch("missing 'intent' field".into()))?;
    let intent: Intent = intent_str
        .parse()
        .map_err(|e| IntentError::SchemaMismatch(format!("invalid intent: {e}")))?;

    let confidence = input
        .get("confidence")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| IntentError::SchemaMismatch("missing 'confidence' field".into()))?
        as f32;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(IntentError::SchemaMismatch(format!(
            "confidence out of range: {confidence}"
        )));
    }

    let suggested_story_type = input
        .get("suggested_story_type")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok());

    let suggested_phase = input
        .get("conversation_phase")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok());

    let entities = input
        .get("entities")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    Ok(ClassifiedIntent {
        intent,
        confidence,
        suggested_story_type,
        suggested_phase,
        entities,
        source: ClassificationSource::Llm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_output() {
        let raw = serde_json::json!({
            "intent": "create_story",
            "confidence": 0.92,
            "suggested_story_type": "bedtime",
            "entities": {"child_name": "Mia"}
        });
        let parsed = parse_tool_output(&raw).unwrap();
        assert_eq!(parsed.intent, Intent::CreateStory);
        assert_eq!(parsed.suggested_story_type, Some(storyline_core::types::StoryType::Bedtime));
    }

    #[test]
    fn rejects_missing_confidence() {
        let raw = serde_json::json!({"intent": "create_story"});
        assert!(parse_tool_output(&raw).is_err());
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let raw = serde_json::json!({"intent": "create_story", "confidence": 1.5});
        assert!(parse_tool_output(&raw).is_err());
    }

    #[test]
    fn rejects_unknown_intent_string() {
        let raw = serde_json::json!({"intent": "fly_to_the_moon", "confidence": 0.5});
        assert!(parse_tool_output(&raw).is_err());
    }
}
