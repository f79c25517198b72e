use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use storyline_core::types::{Channel, ConversationPhase, SessionId, StoryType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub content: String,
    pub at: String,
}

/// One device-to-device handoff, capped at 10 entries (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceHandoffEntry {
    pub channel: Channel,
    pub device_id: Option<String>,
    pub switched_at: String,
}

/// What interrupted the conversation (§4.2 `handleInterruption(sessionId,
/// kind, snapshot)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionKind {
    UserStop,
    SystemError,
    Timeout,
    DeviceSwitch,
}

/// Everything needed to resume a conversation after it was interrupted
/// mid-flow (§3, §4.2). `pendingActions` is derived from the phase and
/// story state at the moment of interruption, not stored independently of
/// them, so it can never drift out of sync with what actually happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptionState {
    pub kind: InterruptionKind,
    pub last_complete_action: String,
    pub pending_actions: Vec<String>,
    pub resumption_prompt: String,
    pub context_snapshot: serde_json::Value,
    pub stashed_at: String,
}

/// One speaker's state stashed while another speaker is active on a
/// shared-device session (§4.2 `switchUserContext`, §3 `userSeparation`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub phase: ConversationPhase,
    pub story_state: serde_json::Value,
    pub last_intent: Option<String>,
    pub story_preferences: serde_json::Value,
    pub emotional_state: serde_json::Value,
}

/// Multi-user partitioning for a shared device (§3 `userContext`). `active_users`
/// tracks everyone who has spoken during the life of the session;
/// `user_separation` holds the stashed state of whichever of them is not
/// currently active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub primary_user_id: String,
    pub active_users: Vec<String>,
    pub user_separation: HashMap<String, UserSnapshot>,
}

impl UserContext {
    pub fn new(primary_user_id: impl Into<String>) -> Self {
        let primary_user_id = primary_user_id.into();
        Self {
            active_users: vec![primary_user_id.clone()],
            primary_user_id,
            user_separation: HashMap::new(),
        }
    }
}

/// The full in-flight conversation context a session carries between turns
/// (§4.2). This is what gets cached, compressed, and optionally encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedConversationContext {
    pub session_id: String,
    pub user_id: String,
    pub parent_session_id: Option<String>,
    /// Every ancestor session id this context descends from via handoff or
    /// resumption. `session_id` must never appear in its own chain (§3/§8).
    pub session_chain: Vec<String>,
    pub conversation_phase: ConversationPhase,
    pub story_id: Option<String>,
    pub character_id: Option<String>,
    pub story_type: Option<StoryType>,
    /// Capped at `H_max` turns (oldest dropped first).
    pub conversation_history: Vec<ConversationTurn>,
    /// Capped at 10 entries (oldest dropped first).
    pub device_history: Vec<DeviceHandoffEntry>,
    pub story_state: serde_json::Value,
    pub story_preferences: serde_json::Value,
    pub emotional_state: serde_json::Value,
    pub last_intent: Option<String>,
    pub interruption_state: Option<InterruptionState>,
    /// Which co-present speaker is currently active, for multi-user voice
    /// devices that separate per-speaker context (§4.2 speaker separation).
    pub active_user_id: Option<String>,
    pub user_context: UserContext,
    pub created_at: String,
    pub updated_at: String,
    pub expires_at: String,
}

impl EnhancedConversationContext {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, ttl_seconds: i64) -> Self {
        let now = chrono::Utc::now();
        let session_id = session_id.into();
        let user_id = user_id.into();
        Self {
            session_id,
            user_id: user_id.clone(),
            parent_session_id: None,
            session_chain: Vec::new(),
            conversation_phase: ConversationPhase::default(),
            story_id: None,
            character_id: None,
            story_type: None,
            conversation_history: Vec::new(),
            device_history: Vec::new(),
            story_state: serde_json::json!({}),
            story_preferences: serde_json::json!({}),
            emotional_state: serde_json::json!({}),
            last_intent: None,
            interruption_state: None,
            active_user_id: Some(user_id.clone()),
            user_context: UserContext::new(user_id),
            created_at: now.to_rfc3339(),
            updated_at: now.to_rfc3339(),
            expires_at: (now + chrono::Duration::seconds(ttl_seconds)).to_rfc3339(),
        }
    }

    /// Append a turn, dropping the oldest once `h_max` is exceeded (§3 invariant
    /// |conversationHistory| <= H_max).
    pub fn push_turn(&mut self, speaker: Speaker, content: impl Into<String>, h_max: usize) {
        self.conversation_history.push(ConversationTurn {
            speaker,
            content: content.into(),
            at: chrono::Utc::now().to_rfc3339(),
        });
        while self.conversation_history.len() > h_max {
            self.conversation_history.remove(0);
        }
    }

    /// Record a device handoff, enforcing the 10-entry cap and the
    /// self-reference invariant on the session chain (§3/§8).
    pub fn push_device_handoff(
        &mut self,
        channel: Channel,
        device_id: Option<String>,
        max_entries: usize,
    ) {
        self.device_history.push(DeviceHandoffEntry {
            channel,
            device_id,
            switched_at: chrono::Utc::now().to_rfc3339(),
        });
        while self.device_history.len() > max_entries {
            self.device_history.remove(0);
        }
    }

    /// Link this context to its predecessor, refusing to create a cycle.
    pub fn link_parent(&mut self, parent_session_id: &str) -> Result<(), String> {
        if parent_session_id == self.session_id || self.session_chain.contains(&self.session_id) {
            return Err(format!(
                "session {} cannot appear in its own chain",
                self.session_id
            ));
        }
        self.parent_session_id = Some(parent_session_id.to_string());
        if !self.session_chain.contains(&parent_session_id.to_string()) {
            self.session_chain.push(parent_session_id.to_string());
        }
        Ok(())
    }

    pub fn touch(&mut self, ttl_seconds: i64) {
        let now = chrono::Utc::now();
        self.updated_at = now.to_rfc3339();
        self.expires_at = (now + chrono::Duration::seconds(ttl_seconds)).to_rfc3339();
    }

    pub fn is_expired(&self) -> bool {
        match chrono::DateTime::parse_from_rfc3339(&self.expires_at) {
            Ok(exp) => exp < chrono::Utc::now(),
            Err(_) => false,
        }
    }
}

/// Strongly-typed session identifier wrapper, used where a fresh id must be
/// minted (session chains, resumption handoffs).
pub fn new_session_id() -> SessionId {
    SessionId::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_history_caps_at_h_max() {
        let mut ctx = EnhancedConversationContext::new("s1", "u1", 3600);
        for i in 0..25 {
            ctx.push_turn(Speaker::User, format!("turn {i}"), 20);
        }
        assert_eq!(ctx.conversation_history.len(), 20);
        assert_eq!(ctx.conversation_history[0].content, "turn 5");
    }

    #[test]
    fn device_history_caps_at_ten() {
        let mut ctx = EnhancedConversationContext::new("s1", "u1", 3600);
        for _ in 0..15 {
            ctx.push_device_handoff(Channel::Voice, None, 10);
        }
        assert_eq!(ctx.device_history.len(), 10);
    }

    #[test]
    fn link_parent_rejects_self_reference() {
        let mut ctx = EnhancedConversationContext::new("s1", "u1", 3600);
        assert!(ctx.link_parent("s1").is_err());
    }

    #[test]
    fn expires_at_is_after_updated_at() {
        let ctx = EnhancedConversationContext::new("s1", "u1", 60);
        let updated = chrono::DateTime::parse_from_rfc3339(&ctx.updated_at).unwrap();
        let expires = chrono::DateTime::parse_from_rfc3339(&ctx.expires_at).unwrap();
        assert!(expires > updated);
    }

    #[test]
    fn fresh_context_has_itself_as_the_only_active_user() {
        let ctx = EnhancedConversationContext::new("s1", "u1", 3600);
        assert_eq!(ctx.user_context.primary_user_id, "u1");
        assert_eq!(ctx.user_context.active_users, vec!["u1".to_string()]);
        assert!(ctx.user_context.user_separation.is_empty());
    }
}
