//! Synchronous RPC dispatch to the opaque downstream agents (§4.7 step 8,
//! §6 "single RPC shape"). Mirrors `storyline_jobs::dispatch`'s
//! trait-object-over-HTTP pattern — this is the `RequestResponse`
//! invocation mode, that crate's is `Event` (fire-and-forget).

use async_trait::async_trait;
use storyline_capability::BaseResponse;
use storyline_intent::Intent;
use tracing::warn;

use crate::routing::TargetAgent;

#[derive(Debug, serde::Serialize)]
pub struct SyncAgentRequest {
    pub action: &'static str,
    pub user_id: String,
    pub session_id: String,
    pub parameters: serde_json::Value,
}

#[async_trait]
pub trait SyncAgentDispatcher: Send + Sync {
    async fn dispatch(&self, target: TargetAgent, req: &SyncAgentRequest) -> Result<BaseResponse, DispatchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("agent error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Maps each intent onto the action name it sends over the RPC shape
/// (§6 "known actions").
pub fn action_for(intent: Intent) -> &'static str {
    match intent {
        Intent::Greeting => "greeting",
        Intent::CreateStory => "generate_story",
        Intent::ContinueStory => "continue_story",
        Intent::EditStory => "edit_story",
        Intent::FinishStory => "finish_story",
        Intent::CreateCharacter => "create_character",
        Intent::EditCharacter => "edit_character",
        Intent::ConfirmCharacter => "confirm_character",
        Intent::ViewLibrary => "view_library",
        Intent::ShareStory => "share_story",
        Intent::DeleteStory => "delete_story",
        Intent::EmotionCheckin => "emotion_checkin",
        Intent::MoodUpdate => "mood_update",
        Intent::SubscriptionManagement => "subscription_management",
        Intent::ConnectHue => "connect_hue",
        Intent::HueStatus => "hue_status",
        Intent::ControlLights => "control_lights",
        Intent::StartConversation => "start_conversation",
        Intent::ContinueConversation => "continue_conversation",
        Intent::EndConversation => "end_conversation",
        Intent::ResumeConversation => "resume_conversation",
        Intent::AccountLinking => "account_linking",
        Intent::Unknown => "unknown",
    }
}

/// A generic `{action, ...payload}` POST to a configured agent endpoint.
pub struct HttpSyncAgentDispatcher {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpSyncAgentDispatcher {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SyncAgentDispatcher for HttpSyncAgentDispatcher {
    async fn dispatch(&self, _target: TargetAgent, req: &SyncAgentRequest) -> Result<BaseResponse, DispatchError> {
        let resp = self.client.post(&self.endpoint).json(req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Api { status: status.as_u16(), message });
        }
        Ok(resp.json::<BaseResponse>().await?)
    }
}

/// Used when no downstream agent endpoint is configured — composes a
/// canned reply so the pipeline still completes end to end (tests, local
/// dev, and the bundled demo config).
pub struct NoopSyncAgentDispatcher;

#[async_trait]
impl SyncAgentDispatcher for NoopSyncAgentDispatcher {
    async fn dispatch(&self, target: TargetAgent, req: &SyncAgentRequest) -> Result<BaseResponse, DispatchError> {
        warn!(action = req.action, ?target, "no sync agent endpoint configured, returning canned response");
        let text = match req.action {
            "greeting" => "Hi there! What would you like to do today?",
            "generate_story" => "Let's get your story started!",
            "continue_story" => "Picking up where we left off.",
            "edit_story" => "Got it, updating your story.",
            "finish_story" => "Wrapping up your story now.",
            "create_character" => "Let's build your character.",
            "edit_character" => "Got it, updating your character.",
            "confirm_character" => "Character looks great, locking that in.",
            "view_library" => "Here's your story library.",
            "share_story" => "Sharing your story now.",
            "delete_story" => "That story has been removed.",
            "emotion_checkin" => "I'm here for you. How are you feeling?",
            "mood_update" => "Thanks for letting me know how you're feeling.",
            "subscription_management" => "Let's take a look at your subscription.",
            "connect_hue" => "Connecting to your lights.",
            "hue_status" => "Checking your lights now.",
            "control_lights" => "Adjusting the lights for you.",
            "start_conversation" => "Hi! I'm ready when you are.",
            "continue_conversation" => "I'm still here, go ahead.",
            "end_conversation" => "Talk soon!",
            "resume_conversation" => "Welcome back!",
            "account_linking" => "Let's get your account linked.",
            _ => "I'm not sure what you mean yet, but I'm listening.",
        };
        Ok(BaseResponse {
            text: text.to_string(),
            ssml: None,
            choices: Vec::new(),
            image_url: None,
            video_url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_dispatcher_returns_a_response_for_every_action() {
        let dispatcher = NoopSyncAgentDispatcher;
        for intent in [
            Intent::Greeting,
            Intent::CreateStory,
            Intent::ContinueStory,
            Intent::EditStory,
            Intent::FinishStory,
            Intent::CreateCharacter,
            Intent::EditCharacter,
            Intent::ConfirmCharacter,
            Intent::ViewLibrary,
            Intent::ShareStory,
            Intent::DeleteStory,
            Intent::EmotionCheckin,
            Intent::MoodUpdate,
            Intent::SubscriptionManagement,
            Intent::ConnectHue,
            Intent::HueStatus,
            Intent::ControlLights,
            Intent::StartConversation,
            Intent::ContinueConversation,
            Intent::EndConversation,
            Intent::ResumeConversation,
            Intent::AccountLinking,
            Intent::Unknown,
        ] {
            let req = SyncAgentRequest {
                action: action_for(intent),
                user_id: "u1".into(),
                session_id: "s1".into(),
                parameters: serde_json::json!({}),
            };
            let resp = dispatcher.dispatch(crate::routing::target_agent(intent), &req).await.unwrap();
            assert!(!resp.text.is_empty());
        }
    }
}
