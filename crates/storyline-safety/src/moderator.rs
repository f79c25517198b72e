use std::sync::Arc;

use storyline_llm::LlmProvider;
use tracing::info;

use crate::crisis::trigger_crisis_intervention;
use crate::keyword_gate::KeywordGate;
use crate::llm_gate::LlmModerationGate;
use crate::types::SafetyVerdict;

/// Combines the keyword gate and the LLM moderation gate into the single
/// screen the orchestrator calls per turn (§4.4). The keyword gate always
/// runs; the LLM gate only runs when the keyword pass didn't already hit
/// crisis severity, since nothing it returns can outrank that.
pub struct SafetyModerator {
    keyword_gate: KeywordGate,
    llm_gate: LlmModerationGate,
}

impl SafetyModerator {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            keyword_gate: KeywordGate::new(),
            llm_gate: LlmModerationGate::new(provider, model),
        }
    }

    /// Screen a single utterance, combining both gates by taking the more
    /// severe verdict (§4.4 severity combination). On LLM gate failure,
    /// the keyword verdict alone stands — moderation degrades, it never
    /// disappears.
    pub async fn screen(&self, user_id: &str, text: &str) -> SafetyVerdict {
        let keyword_verdict = self.keyword_gate.scan(text);
        if keyword_verdict.requires_crisis_intervention {
            trigger_crisis_intervention(user_id, text);
            return keyword_verdict;
        }

        let llm_verdict = match self.llm_gate.moderate(text).await {
            Ok(v) => v,
            Err(e) => {
                info!(err = %e, "LLM moderation gate failed, using keyword verdict only");
                return keyword_verdict;
            }
        };

        let combined = if llm_verdict.severity > keyword_verdict.severity {
            llm_verdict
        } else {
            keyword_verdict
        };

        if combined.requires_crisis_intervention {
            trigger_crisis_intervention(user_id, text);
        }
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use storyline_llm::{ChatRequest, ChatResponse, ProviderError, ToolCall};

    struct FixedModerationProvider {
        severity: &'static str,
    }

    #[async_trait]
    impl LlmProvider for FixedModerationProvider {
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
                    id: "c1".into(),
                    name: "moderate".into(),
                    input: serde_json::json!({"severity": self.severity, "category": "none"}),
                }],
            })
        }
    }

    #[tokio::test]
    async fn keyword_crisis_short_circuits_llm_gate() {
        let moderator = SafetyModerator::new(Arc::new(FixedModerationProvider { severity: "none" }), "m");
        let verdict = moderator.screen("u1", "I want to end my life").await;
        assert!(verdict.requires_crisis_intervention);
    }

    #[tokio::test]
    async fn llm_gate_can_escalate_past_clean_keyword_pass() {
        let moderator = SafetyModerator::new(Arc::new(FixedModerationProvider { severity: "high" }), "m");
        let verdict = moderator.screen("u1", "a completely ordinary sentence").await;
        assert_eq!(verdict.severity, crate::types::Severity::High);
    }
}
