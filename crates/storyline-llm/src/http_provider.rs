use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, Role, ToolCall};

/// A generic OpenAI-compatible chat-completions endpoint. Every concrete
/// backend this system talks to (story-content generation, image prompts,
/// moderation, classification) speaks this wire shape or a close variant, so
/// one adapter covers them all — configuration (`endpoint`, `api_key`,
/// `model`) lives in `storyline_core::config::LlmEndpointConfig`.
pub struct HttpChatProvider {
    name: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpChatProvider {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct WireResponse {
    content: String,
    #[serde(default)]
    model: String,
    #[serde(default)]
    usage: WireUsage,
    #[serde(default = "default_stop_reason")]
    stop_reason: String,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

fn default_stop_reason() -> String {
    "end_turn".to_string()
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: String,
    name: String,
    input: serde_json::Value,
}

#[async_trait]
impl LlmProvider for HttpChatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut messages = vec![WireMessage {
            role: "system",
            content: req.system.clone(),
        }];
        for m in &req.messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            messages.push(WireMessage {
                role,
                content: m.content.clone(),
            });
        }

        let wire = WireRequest {
            model: &req.model,
            messages,
            max_tokens: req.max_tokens,
            tools: req
                .tools
                .iter()
                .map(|t| WireTool {
                    name: &t.name,
                    description: &t.description,
                    input_schema: &t.input_schema,
                })
                .collect(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&wire)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(ProviderError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: WireResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(ChatResponse {
            content: body.content,
            model: if body.model.is_empty() { req.model.clone() } else { body.model },
            tokens_in: body.usage.input_tokens,
            tokens_out: body.usage.output_tokens,
            stop_reason: body.stop_reason,
            tool_calls: body
                .tool_calls
                .into_iter()
                .map(|t| ToolCall {
                    id: t.id,
                    name: t.name,
                    input: t.input,
                })
                .collect(),
        })
    }
}
