use std::collections::HashMap;
use std::sync::Arc;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use tracing::{debug, warn};

use storyline_core::types::{Channel, ConversationPhase};
use storyline_store::{KvCache, RowStore};

use crate::error::{ContinuityError, Result};
use crate::types::{
    ConversationTurn, EnhancedConversationContext, InterruptionKind, InterruptionState, Speaker,
};

const FLAG_COMPRESSED: u8 = 0b01;
const FLAG_ENCRYPTED: u8 = 0b10;
const NONCE_LEN: usize = 12;
/// How many of a user's session ids the recency index remembers (§4.2 step 2).
const USER_SESSION_INDEX_CAP: usize = 20;
/// How much conversation history an inherited session carries over from its
/// predecessor, not the full `H_max` tail (§4.2 step 3).
const INHERITED_HISTORY_TAIL: usize = 5;

/// Owns the get/save lifecycle for `EnhancedConversationContext` (§4.2):
/// fast-path reads and writes go through the KV cache, durable snapshots
/// land in the row store once a session has left the greeting phase, and
/// large or sensitive payloads are transparently compressed/encrypted.
pub struct ContinuityManager {
    kv: Arc<dyn KvCache>,
    store: Arc<RowStore>,
    encryption_keys: HashMap<String, [u8; 32]>,
    active_key_id: Option<String>,
    key_prefix: String,
    ttl_seconds: i64,
    h_max: usize,
    device_history_max: usize,
    compress_threshold_bytes: usize,
}

impl ContinuityManager {
    pub fn new(
        kv: Arc<dyn KvCache>,
        store: Arc<RowStore>,
        key_prefix: impl Into<String>,
        encryption_keys: HashMap<String, [u8; 32]>,
        active_key_id: Option<String>,
        ttl_seconds: i64,
        h_max: usize,
        device_history_max: usize,
        compress_threshold_bytes: usize,
    ) -> Self {
        Self {
            kv,
            store,
            encryption_keys,
            active_key_id,
            key_prefix: key_prefix.into(),
            ttl_seconds,
            h_max,
            device_history_max,
            compress_threshold_bytes,
        }
    }

    fn context_key(&self, session_id: &str) -> String {
        storyline_store::kv::keys::context(&self.key_prefix, session_id)
    }

    fn user_sessions_key(&self, user_id: &str) -> String {
        storyline_store::kv::keys::user_sessions(&self.key_prefix, user_id)
    }

    fn active_encryption_key(&self) -> Option<(String, [u8; 32])> {
        let id = self.active_key_id.as_ref()?;
        self.encryption_keys.get(id).map(|key| (id.clone(), *key))
    }

    /// Load the context for `session_id`. Resolution order (§4.2
    /// `getOrCreateContext`): exact cache/row hit, then the most-recently
    /// updated non-completed session for the same user (inheriting its
    /// phase and state into a fresh session linked to it), then a brand
    /// new context.
    pub async fn get_or_create_context(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> Result<EnhancedConversationContext> {
        if let Some(ctx) = self.get_context(session_id).await? {
            return Ok(ctx);
        }

        if let Some(row) = self.store.get_session(session_id)? {
            let ctx = row_to_context(row);
            self.cache_context(&ctx).await?;
            return Ok(ctx);
        }

        if let Some(prior) = self.find_resumable_prior_session(session_id, user_id).await? {
            let ctx = self.inherit_context(session_id, &prior);
            self.cache_context(&ctx).await?;
            return Ok(ctx);
        }

        let ctx = EnhancedConversationContext::new(session_id, user_id, self.ttl_seconds);
        self.cache_context(&ctx).await?;
        Ok(ctx)
    }

    /// Scan the user's session index for the most-recently-updated session
    /// that isn't the one we're resolving and hasn't already concluded
    /// normally (§4.2 step 2-3; a session that reached `completion` was
    /// handed off cleanly and has nothing left to resume).
    async fn find_resumable_prior_session(
        &self,
        exclude_session_id: &str,
        user_id: &str,
    ) -> Result<Option<EnhancedConversationContext>> {
        let index_key = self.user_sessions_key(user_id);
        let candidates: Vec<String> = match self.kv.get(&index_key).await.map_err(ContinuityError::Store)? {
            Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            None => Vec::new(),
        };
        for candidate_id in candidates.iter().filter(|id| id.as_str() != exclude_session_id) {
            if let Some(ctx) = self.get_context(candidate_id).await? {
                if ctx.conversation_phase != ConversationPhase::Completion {
                    return Ok(Some(ctx));
                }
            }
        }
        Ok(None)
    }

    fn inherit_context(
        &self,
        new_session_id: &str,
        prior: &EnhancedConversationContext,
    ) -> EnhancedConversationContext {
        let mut ctx = EnhancedConversationContext::new(new_session_id, &prior.user_id, self.ttl_seconds);
        ctx.conversation_phase = prior.conversation_phase;
        ctx.story_state = prior.story_state.clone();
        ctx.story_preferences = prior.story_preferences.clone();
        ctx.emotional_state = prior.emotional_state.clone();
        ctx.story_id = prior.story_id.clone();
        ctx.character_id = prior.character_id.clone();
        ctx.story_type = prior.story_type;
        ctx.last_intent = prior.last_intent.clone();
        ctx.user_context = prior.user_context.clone();
        ctx.conversation_history = prior
            .conversation_history
            .iter()
            .rev()
            .take(INHERITED_HISTORY_TAIL)
            .rev()
            .cloned()
            .collect();
        // `new_session_id` is always distinct from `prior.session_id`, so this
        // can only fail on a self-reference, which cannot happen here.
        let _ = ctx.link_parent(&prior.session_id);
        ctx
    }

    /// Read-only lookup; does not create anything (§4.2 `getContext`).
    pub async fn get_context(&self, session_id: &str) -> Result<Option<EnhancedConversationContext>> {
        let key = self.context_key(session_id);
        let raw = self.kv.get(&key).await.map_err(ContinuityError::Store)?;
        match raw {
            Some(bytes) => Ok(Some(self.decode(session_id, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Persist the context: cache it, and durably snapshot once the
    /// conversation has produced something worth surviving a cache eviction
    /// (past the bare greeting).
    pub async fn save_context(&self, ctx: &mut EnhancedConversationContext) -> Result<()> {
        ctx.touch(self.ttl_seconds);
        self.cache_context(ctx).await?;

        if ctx.conversation_phase != ConversationPhase::Greeting {
            let row = context_to_row(ctx);
            self.store.upsert_session(&row)?;
        }
        Ok(())
    }

    async fn cache_context(&self, ctx: &EnhancedConversationContext) -> Result<()> {
        let key = self.context_key(&ctx.session_id);
        let bytes = self.encode(ctx, should_encrypt(ctx))?;
        self.kv
            .set_ex(&key, self.ttl_seconds, bytes)
            .await
            .map_err(ContinuityError::Store)?;
        self.touch_user_session_index(&ctx.user_id, &ctx.session_id).await
    }

    /// Re-insert `session_id` at the front of its user's recency index, so
    /// the next `getOrCreateContext` scan for this user finds it first.
    async fn touch_user_session_index(&self, user_id: &str, session_id: &str) -> Result<()> {
        let index_key = self.user_sessions_key(user_id);
        let mut ids: Vec<String> = match self.kv.get(&index_key).await.map_err(ContinuityError::Store)? {
            Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            None => Vec::new(),
        };
        ids.retain(|id| id != session_id);
        ids.insert(0, session_id.to_string());
        ids.truncate(USER_SESSION_INDEX_CAP);
        let bytes = serde_json::to_vec(&ids)?;
        self.kv
            .set_ex(&index_key, self.ttl_seconds, bytes)
            .await
            .map_err(ContinuityError::Store)
    }

    fn encode(&self, ctx: &EnhancedConversationContext, sensitive: bool) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(ctx)?;
        let (payload, compressed) = if json.len() >= self.compress_threshold_bytes {
            (gzip(&json)?, true)
        } else {
            (json, false)
        };
        let (payload, encrypted, key_id) = if sensitive {
            match self.active_encryption_key() {
                Some((key_id, key)) => (encrypt(&key, &payload), true, Some(key_id)),
                None => {
                    warn!("sensitive context requested but no encryption key configured");
                    (payload, false, None)
                }
            }
        } else {
            (payload, false, None)
        };

        let mut flags = 0u8;
        if compressed {
            flags |= FLAG_COMPRESSED;
        }
        if encrypted {
            flags |= FLAG_ENCRYPTED;
        }
        let mut out = Vec::with_capacity(payload.len() + 2);
        out.push(flags);
        if let Some(key_id) = key_id {
            let id_bytes = key_id.as_bytes();
            out.push(id_bytes.len() as u8);
            out.extend_from_slice(id_bytes);
        }
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn decode(&self, session_id: &str, bytes: &[u8]) -> Result<EnhancedConversationContext> {
        let (flags, rest) = bytes
            .split_first()
            .ok_or_else(|| ContinuityError::CorruptEntry("empty cache entry".into()))?;
        let mut payload = if flags & FLAG_ENCRYPTED != 0 {
            let (id_len, rest) = rest
                .split_first()
                .ok_or_else(|| ContinuityError::CorruptEntry("truncated cache entry".into()))?;
            if rest.len() < *id_len as usize {
                return Err(ContinuityError::CorruptEntry("truncated key id".into()));
            }
            let (id_bytes, ciphertext) = rest.split_at(*id_len as usize);
            let key_id = String::from_utf8_lossy(id_bytes).to_string();
            let key = self.encryption_keys.get(&key_id).ok_or_else(|| ContinuityError::UnknownKeyId {
                session_id: session_id.to_string(),
                key_id: key_id.clone(),
            })?;
            decrypt(key, ciphertext).ok_or_else(|| ContinuityError::Decrypt {
                session_id: session_id.to_string(),
            })?
        } else {
            rest.to_vec()
        };

        if flags & FLAG_COMPRESSED != 0 {
            payload = gunzip(&payload).map_err(|e| ContinuityError::Compression(e.to_string()))?;
        }

        Ok(serde_json::from_slice(&payload)?)
    }

    /// Stash interruption state, deriving what's still left to do from the
    /// phase and story state rather than tracking it separately (§3
    /// invariant, §4.2 `handleInterruption`). Does not advance the phase
    /// itself.
    pub fn handle_interruption(&self, ctx: &mut EnhancedConversationContext, kind: InterruptionKind) {
        let last_complete_action = ctx
            .conversation_history
            .iter()
            .rev()
            .find(|t| t.speaker == Speaker::Assistant)
            .map(|t| t.content.clone())
            .unwrap_or_else(|| "session_started".to_string());
        let pending_actions = derive_pending_actions(ctx.conversation_phase, &ctx.story_state);
        let resumption_prompt = phase_resumption_line(ctx.conversation_phase, ctx.conversation_history.last());
        ctx.interruption_state = Some(InterruptionState {
            kind,
            last_complete_action,
            pending_actions,
            resumption_prompt,
            context_snapshot: serde_json::json!({
                "phase": ctx.conversation_phase,
                "story_state": ctx.story_state,
            }),
            stashed_at: chrono::Utc::now().to_rfc3339(),
        });
    }

    /// A short, user-facing sentence summarising where the conversation left
    /// off and how long ago, for use when a session resumes after an
    /// interruption (§4.2 `generateResumptionPrompt`).
    pub fn generate_resumption_prompt(&self, ctx: &EnhancedConversationContext) -> String {
        let Some(interruption) = &ctx.interruption_state else {
            return "Let's pick up where we left off.".to_string();
        };
        format!(
            "You were here {} — {}",
            elapsed_phrase(&ctx.updated_at),
            interruption.resumption_prompt
        )
    }

    /// Record a channel/device switch, enforcing the 10-entry cap (§4.2
    /// `handleDeviceHandoff`).
    pub fn handle_device_handoff(
        &self,
        ctx: &mut EnhancedConversationContext,
        channel: Channel,
        device_id: Option<String>,
    ) {
        ctx.push_device_handoff(channel, device_id, self.device_history_max);
    }

    /// Fork off a context for a second speaker sharing the same device,
    /// linked back to the primary session via the session chain (§4.2
    /// speaker separation).
    pub fn separate_user_context(
        &self,
        ctx: &EnhancedConversationContext,
        new_session_id: &str,
        other_user_id: &str,
    ) -> Result<EnhancedConversationContext> {
        let mut fresh = EnhancedConversationContext::new(new_session_id, other_user_id, self.ttl_seconds);
        fresh
            .link_parent(&ctx.session_id)
            .map_err(ContinuityError::InvalidHandoff)?;
        fresh.story_type = ctx.story_type;
        Ok(fresh)
    }

    /// Switch the active speaker on a shared-device context, stashing the
    /// outgoing speaker's state into `userContext.userSeparation` and
    /// restoring the incoming speaker's stashed state, if any (§4.2
    /// `switchUserContext`).
    pub fn switch_user_context(&self, ctx: &mut EnhancedConversationContext, user_id: &str) {
        if let Some(outgoing) = ctx.active_user_id.clone() {
            if outgoing != user_id {
                ctx.user_context.user_separation.insert(
                    outgoing,
                    crate::types::UserSnapshot {
                        phase: ctx.conversation_phase,
                        story_state: ctx.story_state.clone(),
                        last_intent: ctx.last_intent.clone(),
                        story_preferences: ctx.story_preferences.clone(),
                        emotional_state: ctx.emotional_state.clone(),
                    },
                );
            }
        }

        if let Some(incoming) = ctx.user_context.user_separation.remove(user_id) {
            ctx.conversation_phase = incoming.phase;
            ctx.story_state = incoming.story_state;
            ctx.last_intent = incoming.last_intent;
            ctx.story_preferences = incoming.story_preferences;
            ctx.emotional_state = incoming.emotional_state;
        }

        if !ctx.user_context.active_users.iter().any(|u| u == user_id) {
            ctx.user_context.active_users.push(user_id.to_string());
        }
        ctx.active_user_id = Some(user_id.to_string());
    }

    pub fn push_turn(&self, ctx: &mut EnhancedConversationContext, speaker: Speaker, content: impl Into<String>) {
        ctx.push_turn(speaker, content, self.h_max);
    }

    /// Sweep the KV cache for keys whose TTL already expired or never
    /// existed, and drop any durable session row past its `expiresAt` (§4.2
    /// cleanup tick, §9 batch cap).
    pub async fn cleanup_tick(&self, scan_prefix: &str, batch_size: usize) -> Result<usize> {
        let candidates = self
            .kv
            .scan_by_prefix(scan_prefix)
            .await
            .map_err(ContinuityError::Store)?;
        let mut cleaned = 0usize;
        for key in candidates.into_iter().take(batch_size) {
            let ttl = self.kv.ttl(&key).await.map_err(ContinuityError::Store)?;
            if ttl == storyline_store::kv::TTL_NO_KEY || ttl == 0 {
                self.kv.del(&key).await.map_err(ContinuityError::Store)?;
                cleaned += 1;
            }
        }
        let now = chrono::Utc::now().to_rfc3339();
        cleaned += self.store.delete_expired_sessions(&now)?;
        debug!(cleaned, "continuity cleanup tick finished");
        Ok(cleaned)
    }
}

/// Encrypt whenever the payload carries anything that would be unacceptable
/// to leave in cleartext past the turn: real conversation content, details
/// about a specific child, a stashed interruption, or another speaker's
/// stashed state (§4.2, §4.4 property 5).
fn should_encrypt(ctx: &EnhancedConversationContext) -> bool {
    !ctx.conversation_history.is_empty()
        || ctx.character_id.is_some()
        || ctx.interruption_state.is_some()
        || !ctx.user_context.user_separation.is_empty()
}

/// Mirrors the §4.2 examples: character creation still needs a name,
/// story building still needs an outline, asset generation is still
/// running — each of these becomes the action queued up to resume.
fn derive_pending_actions(phase: ConversationPhase, story_state: &serde_json::Value) -> Vec<String> {
    match phase {
        ConversationPhase::CharacterCreation => {
            if story_state.get("character_name").and_then(|v| v.as_str()).unwrap_or("").is_empty() {
                vec!["collect_character_name".to_string()]
            } else {
                vec!["confirm_character".to_string()]
            }
        }
        ConversationPhase::StoryBuilding => {
            if story_state.get("outline").is_none() {
                vec!["create_story_outline".to_string()]
            } else {
                vec!["continue_story_building".to_string()]
            }
        }
        ConversationPhase::StoryEditing => vec!["apply_story_edits".to_string()],
        ConversationPhase::AssetGeneration => vec!["complete_asset_generation".to_string()],
        ConversationPhase::EmotionCheck => vec!["complete_emotion_checkin".to_string()],
        ConversationPhase::Greeting | ConversationPhase::Completion => Vec::new(),
    }
}

fn phase_resumption_line(phase: ConversationPhase, last_turn: Option<&ConversationTurn>) -> String {
    match phase {
        ConversationPhase::StoryBuilding | ConversationPhase::StoryEditing => {
            let last_line = last_turn.map(|t| t.content.as_str()).unwrap_or("");
            format!("we were in the middle of building your story. You'd just said: \"{last_line}\". Want to keep going?")
        }
        ConversationPhase::CharacterCreation => {
            "we were still getting your character put together — want to finish that up?".to_string()
        }
        ConversationPhase::AssetGeneration => {
            "your story's still being put together in the background. I'll let you know the moment it's ready.".to_string()
        }
        _ => "let's continue.".to_string(),
    }
}

/// Elapsed-time bucketing off `updatedAt` (§4.2 `generateResumptionPrompt`).
fn elapsed_phrase(updated_at: &str) -> String {
    let Ok(updated) = chrono::DateTime::parse_from_rfc3339(updated_at) else {
        return "a while ago".to_string();
    };
    let elapsed = chrono::Utc::now().signed_duration_since(updated.with_timezone(&chrono::Utc));
    if elapsed < chrono::Duration::hours(1) {
        "a few minutes ago".to_string()
    } else if elapsed < chrono::Duration::hours(24) {
        let hours = elapsed.num_hours().max(1);
        format!("{hours} hour{} ago", if hours == 1 { "" } else { "s" })
    } else {
        let days = elapsed.num_days().max(1);
        format!("{days} day{} ago", if days == 1 { "" } else { "s" })
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| ContinuityError::Compression(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| ContinuityError::Compression(e.to_string()))
}

fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .expect("encryption does not fail for a valid key/nonce pair");
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    out
}

fn decrypt(key: &[u8; 32], data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < NONCE_LEN {
        return None;
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher.decrypt(Nonce::from_slice(nonce_bytes), ciphertext).ok()
}

fn row_to_context(row: storyline_store::types::ConversationSessionRow) -> EnhancedConversationContext {
    let session_chain: Vec<String> = serde_json::from_value(row.session_chain).unwrap_or_default();
    let phase = row
        .conversation_phase
        .parse()
        .unwrap_or(ConversationPhase::Greeting);
    let story_type = row.story_type.and_then(|s| s.parse().ok());
    let user_context = serde_json::from_value(row.user_context)
        .unwrap_or_else(|_| crate::types::UserContext::new(row.user_id.clone()));
    let interruption_state = row.interruption_state.and_then(|v| serde_json::from_value(v).ok());
    EnhancedConversationContext {
        session_id: row.session_id,
        user_id: row.user_id.clone(),
        parent_session_id: row.parent_session_id,
        session_chain,
        conversation_phase: phase,
        story_id: row.story_id,
        character_id: row.character_id,
        story_type,
        conversation_history: Vec::new(),
        device_history: Vec::new(),
        story_state: row.story_state,
        story_preferences: serde_json::json!({}),
        emotional_state: serde_json::json!({}),
        last_intent: None,
        interruption_state,
        active_user_id: Some(row.user_id),
        user_context,
        created_at: row.created_at,
        updated_at: row.updated_at,
        expires_at: row.expires_at,
    }
}

fn context_to_row(ctx: &EnhancedConversationContext) -> storyline_store::types::ConversationSessionRow {
    storyline_store::types::ConversationSessionRow {
        session_id: ctx.session_id.clone(),
        user_id: ctx.user_id.clone(),
        parent_session_id: ctx.parent_session_id.clone(),
        conversation_phase: ctx.conversation_phase.to_string(),
        story_id: ctx.story_id.clone(),
        character_id: ctx.character_id.clone(),
        story_type: ctx.story_type.map(|t| t.to_string()),
        session_chain: serde_json::json!(ctx.session_chain),
        device_history: serde_json::json!(ctx.device_history),
        story_state: ctx.story_state.clone(),
        interruption_state: ctx
            .interruption_state
            .as_ref()
            .map(|i| serde_json::to_value(i).unwrap_or(serde_json::Value::Null)),
        user_context: serde_json::to_value(&ctx.user_context).unwrap_or(serde_json::json!({})),
        created_at: ctx.created_at.clone(),
        updated_at: ctx.updated_at.clone(),
        expires_at: ctx.expires_at.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyline_store::InMemoryKvCache;

    fn manager() -> ContinuityManager {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        storyline_store::db::init_db(&conn).unwrap();
        let mut keys = HashMap::new();
        keys.insert("k1".to_string(), [7u8; 32]);
        ContinuityManager::new(
            Arc::new(InMemoryKvCache::new()),
            Arc::new(RowStore::new(conn)),
            "test",
            keys,
            Some("k1".to_string()),
            3600,
            20,
            10,
            2048,
        )
    }

    #[tokio::test]
    async fn create_then_fetch_roundtrips() {
        let mgr = manager();
        let ctx = mgr.get_or_create_context("s1", "u1").await.unwrap();
        assert_eq!(ctx.session_id, "s1");
        let fetched = mgr.get_context("s1").await.unwrap().unwrap();
        assert_eq!(fetched.user_id, "u1");
    }

    #[tokio::test]
    async fn save_then_load_survives_interruption_encryption() {
        let mgr = manager();
        let mut ctx = mgr.get_or_create_context("s2", "u2").await.unwrap();
        mgr.handle_interruption(&mut ctx, InterruptionKind::SystemError);
        mgr.push_turn(&mut ctx, Speaker::User, "hello there");
        mgr.save_context(&mut ctx).await.unwrap();

        let loaded = mgr.get_context("s2").await.unwrap().unwrap();
        assert!(loaded.interruption_state.is_some());
        assert_eq!(loaded.conversation_history.len(), 1);
    }

    #[tokio::test]
    async fn resumption_prompt_mentions_story_building_and_recency() {
        let mgr = manager();
        let mut ctx = mgr.get_or_create_context("s3", "u3").await.unwrap();
        ctx.conversation_phase = ConversationPhase::StoryBuilding;
        mgr.push_turn(&mut ctx, Speaker::User, "a dragon who loves painting");
        mgr.handle_interruption(&mut ctx, InterruptionKind::DeviceSwitch);
        let prompt = mgr.generate_resumption_prompt(&ctx);
        assert!(prompt.contains("story"));
        assert!(prompt.contains("a few minutes ago"));
    }

    #[tokio::test]
    async fn interruption_derives_pending_actions_from_phase_and_story_state() {
        let mgr = manager();
        let mut ctx = mgr.get_or_create_context("s3b", "u3b").await.unwrap();
        ctx.conversation_phase = ConversationPhase::CharacterCreation;
        mgr.handle_interruption(&mut ctx, InterruptionKind::UserStop);
        let interruption = ctx.interruption_state.unwrap();
        assert_eq!(interruption.pending_actions, vec!["collect_character_name".to_string()]);
    }

    #[tokio::test]
    async fn device_handoff_is_recorded() {
        let mgr = manager();
        let mut ctx = mgr.get_or_create_context("s4", "u4").await.unwrap();
        mgr.handle_device_handoff(&mut ctx, Channel::Mobile, Some("phone-1".into()));
        assert_eq!(ctx.device_history.len(), 1);
    }

    #[tokio::test]
    async fn new_session_inherits_phase_and_state_from_most_recent_prior_session() {
        let mgr = manager();
        let mut ctx_a = mgr.get_or_create_context("sess-a", "u5").await.unwrap();
        ctx_a.conversation_phase = ConversationPhase::StoryBuilding;
        ctx_a.story_state = serde_json::json!({"outline": "a dragon story"});
        mgr.push_turn(&mut ctx_a, Speaker::User, "turn one");
        mgr.push_turn(&mut ctx_a, Speaker::Assistant, "turn two");
        mgr.save_context(&mut ctx_a).await.unwrap();

        let ctx_b = mgr.get_or_create_context("sess-b", "u5").await.unwrap();
        assert_eq!(ctx_b.conversation_phase, ConversationPhase::StoryBuilding);
        assert_eq!(ctx_b.story_state, serde_json::json!({"outline": "a dragon story"}));
        assert_eq!(ctx_b.parent_session_id, Some("sess-a".to_string()));
        assert!(ctx_b.session_chain.contains(&"sess-a".to_string()));
        assert_eq!(ctx_b.conversation_history.len(), 2);
    }

    #[tokio::test]
    async fn completed_prior_session_is_not_inherited_from() {
        let mgr = manager();
        let mut ctx_a = mgr.get_or_create_context("sess-c", "u6").await.unwrap();
        ctx_a.conversation_phase = ConversationPhase::Completion;
        mgr.save_context(&mut ctx_a).await.unwrap();

        let ctx_b = mgr.get_or_create_context("sess-d", "u6").await.unwrap();
        assert_eq!(ctx_b.conversation_phase, ConversationPhase::Greeting);
        assert!(ctx_b.parent_session_id.is_none());
    }

    #[tokio::test]
    async fn switch_user_context_snapshots_outgoing_and_restores_incoming() {
        let mgr = manager();
        let mut ctx = mgr.get_or_create_context("sess-e", "u7").await.unwrap();
        ctx.conversation_phase = ConversationPhase::StoryBuilding;
        ctx.story_state = serde_json::json!({"outline": "u7's story"});

        mgr.switch_user_context(&mut ctx, "u8");
        assert_eq!(ctx.active_user_id, Some("u8".to_string()));
        assert!(ctx.user_context.user_separation.contains_key("u7"));
        // u8 has no stashed snapshot yet, so switching to them leaves the
        // live fields as they were — nothing to restore.
        assert_eq!(ctx.conversation_phase, ConversationPhase::StoryBuilding);

        ctx.conversation_phase = ConversationPhase::CharacterCreation;
        mgr.switch_user_context(&mut ctx, "u7");
        assert_eq!(ctx.conversation_phase, ConversationPhase::StoryBuilding);
        assert_eq!(ctx.story_state, serde_json::json!({"outline": "u7's story"}));
        assert!(!ctx.user_context.user_separation.contains_key("u7"));
    }

    #[tokio::test]
    async fn context_with_history_is_encrypted_without_interruption() {
        let mgr = manager();
        let mut ctx = mgr.get_or_create_context("sess-f", "u9").await.unwrap();
        mgr.push_turn(&mut ctx, Speaker::User, "once upon a time");
        let bytes = mgr.encode(&ctx, should_encrypt(&ctx)).unwrap();
        assert_ne!(bytes[0] & FLAG_ENCRYPTED, 0);
    }

    #[tokio::test]
    async fn compression_boundary_is_inclusive() {
        let mgr = manager();
        let mut ctx = EnhancedConversationContext::new("sess-g", "u10", 3600);
        // Pad story_state until the serialized context is exactly at the
        // configured threshold.
        loop {
            let size = serde_json::to_vec(&ctx).unwrap().len();
            if size >= mgr.compress_threshold_bytes {
                break;
            }
            let pad = "x".repeat(mgr.compress_threshold_bytes - size);
            ctx.story_state = serde_json::json!({ "pad": pad });
        }
        let bytes = mgr.encode(&ctx, false).unwrap();
        assert_ne!(bytes[0] & FLAG_COMPRESSED, 0);
    }

    #[tokio::test]
    async fn decrypt_with_unknown_key_id_fails() {
        let mgr = manager();
        let mut ctx = mgr.get_or_create_context("sess-h", "u11").await.unwrap();
        mgr.push_turn(&mut ctx, Speaker::User, "hi");
        let bytes = mgr.encode(&ctx, true).unwrap();

        let mut other_keys = HashMap::new();
        other_keys.insert("k2".to_string(), [9u8; 32]);
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        storyline_store::db::init_db(&conn).unwrap();
        let other_mgr = ContinuityManager::new(
            Arc::new(InMemoryKvCache::new()),
            Arc::new(RowStore::new(conn)),
            "test",
            other_keys,
            Some("k2".to_string()),
            3600,
            20,
            10,
            2048,
        );
        let err = other_mgr.decode("sess-h", &bytes).unwrap_err();
        assert!(matches!(err, ContinuityError::UnknownKeyId { .. }));
    }
}
