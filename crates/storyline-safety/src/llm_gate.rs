use std::sync::Arc;

use storyline_llm::{ChatRequest, LlmProvider, Message, Role, ToolDefinition};

use crate::error::{Result, SafetyError};
use crate::types::{SafetyCategory, SafetyVerdict, Severity};

fn moderation_tool() -> ToolDefinition {
    ToolDefinition {
        name: "moderate".to_string(),
        description: "Assess an utterance for content unsafe in a children's storytelling app."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "severity": { "type": "string", "enum": ["none", "low", "medium", "high", "crisis"] },
                "category": {
                    "type": "string",
                    "enum": ["self_harm", "violence", "sexual_content", "substances", "hate_speech", "personal_info", "none"]
                },
                "reason": { "type": "string" }
            },
            "required": ["severity", "category"]
        }),
    }
}

/// Second-pass moderation via the LLM provider, used in combination with
/// the keyword gate (§4.4). This is the slower, semantic pass — it catches
/// phrasing the keyword families miss, at the cost of provider latency.
pub struct LlmModerationGate {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmModerationGate {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub async fn moderate(&self, text: &str) -> Result<SafetyVerdict> {
        let req = ChatRequest {
            model: self.model.clone(),
            system: "You are a content safety classifier for a children's storytelling app. \
                     Classify the user's message."
                .to_string(),
            messages: vec![Message {
                role: Role::User,
                content: text.to_string(),
            }],
            max_tokens: 128,
            tools: vec![moderation_tool()],
        };

        let resp = self.provider.send(&req).await?;
        let call = resp
            .tool_calls
            .first()
            .ok_or_else(|| SafetyError::SchemaMismatch("no tool call returned".into()))?;

        let severity_str = call
            .input
            .get("severity")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SafetyError::SchemaMismatch("missing severity".into()))?;
        let severity = parse_severity(severity_str)
            .ok_or_else(|| SafetyError::SchemaMismatch(format!("unknown severity: {severity_str}")))?;

        let category_str = call
            .input
            .get("category")
            .and_then(|v| v.as_str())
            .unwrap_or("none");
        let category = parse_category(category_str).unwrap_or(SafetyCategory::None);

        let reason = call
            .input
            .get("reason")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(SafetyVerdict {
            severity,
            category,
            triggered_by: reason.into_iter().collect(),
            requires_crisis_intervention: severity == Severity::Crisis,
        })
    }
}

fn parse_severity(s: &str) -> Option<Severity> {
    Some(match s {
        "none" => Severity::None,
        "low" => Severity::Low,
        "medium" => Severity::Medium,
        "high" => Severity::High,
        "crisis" => Severity::Crisis,
        _ => return None,
    })
}

fn parse_category(s: &str) -> Option<SafetyCategory> {
    Some(match s {
        "self_harm" => SafetyCategory::SelfHarm,
        "violence" => SafetyCategory::Violence,
        "sexual_content" => SafetyCategory::SexualContent,
        "substances" => SafetyCategory::Substances,
        "hate_speech" => SafetyCategory::HateSpeech,
        "personal_info" => SafetyCategory::PersonalInfo,
        "none" => SafetyCategory::None,
        _ => return None,
    })
}
