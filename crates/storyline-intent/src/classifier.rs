use std::sync::Arc;

use storyline_core::types::ConversationPhase;
use storyline_llm::{ChatRequest, LlmProvider, Message, Role};
use tracing::warn;

use crate::heuristics::HeuristicClassifier;
use crate::schema::{classify_intent_tool, parse_tool_output};
use crate::types::ClassifiedIntent;

/// Entry point for turn classification (§4.3). Tries the LLM provider
/// first — forcing a function call so the output is structured — and falls
/// back to the keyword heuristic on any provider or schema failure, so an
/// outage degrades the experience instead of stalling the turn.
pub struct IntentClassifier {
    provider: Arc<dyn LlmProvider>,
    model: String,
    heuristic: HeuristicClassifier,
}

impl IntentClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            heuristic: HeuristicClassifier::new(),
        }
    }

    pub async fn classify(
        &self,
        utterance: &str,
        phase: ConversationPhase,
        recent_turns: &[String],
    ) -> ClassifiedIntent {
        match self.classify_via_llm(utterance, phase, recent_turns).await {
            Ok(classified) => classified,
            Err(e) => {
                warn!(err = %e, "intent classification via LLM failed, falling back to heuristic");
                self.heuristic.classify(utterance, phase)
            }
        }
    }

    async fn classify_via_llm(
        &self,
        utterance: &str,
        phase: ConversationPhase,
        recent_turns: &[String],
    ) -> crate::error::Result<ClassifiedIntent> {
        let system = format!(
            "You classify a caregiver's utterance into a fixed set of intents. \
             The conversation is currently in the '{phase}' phase. Recent turns: {}",
            recent_turns.join(" | ")
        );
        let req = ChatRequest {
            model: self.model.clone(),
            system,
            messages: vec![Message {
                role: Role::User,
                content: utterance.to_string(),
            }],
            max_tokens: 256,
            tools: vec![classify_intent_tool()],
        };

        let resp = self.provider.send(&req).await?;
        let call = resp
            .tool_calls
            .first()
            .ok_or_else(|| crate::error::IntentError::SchemaMismatch("no tool call returned".into()))?;
        parse_tool_output(&call.input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use storyline_llm::{ChatResponse, ProviderError, ToolCall};

    struct FixedToolCallProvider {
        input: serde_json::Value,
    }

    #[async_trait]
    impl LlmProvider for FixedToolCallProvider {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: String::new(),
                model: req.model.clone(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "tool_use".into(),
                tool_calls: vec![ToolCall {
                    id: "call_1".into(),
                    name: "classify_intent".into(),
                    input: self.input.clone(),
                }],
            })
        }
    }

    struct AlwaysFailProvider;

    #[async_trait]
    impl LlmProvider for AlwaysFailProvider {
        fn name(&self) -> &str {
            "always-fail"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn uses_llm_result_when_well_formed() {
        let provider = Arc::new(FixedToolCallProvider {
            input: serde_json::json!({"intent": "create_story", "confidence": 0.9}),
        });
        let classifier = IntentClassifier::new(provider, "test-model");
        let result = classifier
            .classify("tell my son a story", ConversationPhase::Greeting, &[])
            .await;
        assert_eq!(result.intent, crate::types::Intent::CreateStory);
    }

    #[tokio::test]
    async fn falls_back_to_heuristic_when_provider_fails() {
        let provider = Arc::new(AlwaysFailProvider);
        let classifier = IntentClassifier::new(provider, "test-model");
        let result = classifier
            .classify("she has green eyes and a red cape", ConversationPhase::StoryBuilding, &[])
            .await;
        assert_eq!(result.intent, crate::types::Intent::ContinueStory);
        assert_eq!(result.source, crate::types::ClassificationSource::Heuristic);
    }
}
