//! Per-turn pipeline (§4.7): authn → capability detect → context load →
//! safety screen → consent/quota gate → intent classify → dispatch →
//! context update → adapted response.

#[cfg(test)]
use std::sync::Arc;

use storyline_capability::{AdaptedResponse, BaseResponse, CapabilityDetector, PlatformContext};
use storyline_continuity::types::Speaker;
use storyline_core::types::{ConversationPhase, Tier};
use storyline_core::{Result, StorylineError};
use storyline_intent::Intent;
use storyline_safety::Severity;
use tracing::{info, warn};

use crate::app::AppState;
use crate::dispatch::{action_for, SyncAgentDispatcher, SyncAgentRequest};
use crate::phase::coerce_transition;
use crate::routing::{is_long_running, is_story_mutating, requires_auth, target_agent};

#[derive(Debug, serde::Deserialize)]
pub struct TurnRequest {
    pub user_id: String,
    pub session_id: String,
    pub channel: storyline_core::types::Channel,
    #[serde(default)]
    pub locale: Option<String>,
    pub user_input: String,
    #[serde(default)]
    pub device_hints: Option<serde_json::Value>,
    pub auth_token: String,
    #[serde(default)]
    pub test_mode: bool,
}

#[derive(Debug, Default, serde::Serialize)]
pub struct SubscribePattern {
    pub table: &'static str,
    pub filter: String,
    pub event: &'static str,
}

/// A single shape covers both the synchronous and the async-story response
/// variants (§6) — unused fields are omitted from the wire payload.
#[derive(Debug, Default, serde::Serialize)]
pub struct TurnResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visuals: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapted_response: Option<AdaptedResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<ConversationPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe_pattern: Option<SubscribePattern>,
}

impl TurnResponse {
    fn blocked(message: impl Into<String>, phase: ConversationPhase) -> Self {
        Self {
            success: false,
            speech_text: Some(message.into()),
            phase: Some(phase),
            ..Default::default()
        }
    }
}

/// Runs the full per-turn pipeline and returns the response to send back to
/// the caller. Any step past authn that fails with a turn-fatal-but-session-
/// survivable error (`persistence_error`, `decrypt_error`, `timeout`) must
/// not have written a context — callers of this function see that
/// invariant preserved because every early-return path here returns before
/// `continuity.save_context` runs.
pub async fn run_turn(
    state: &AppState,
    dispatcher: &dyn SyncAgentDispatcher,
    req: TurnRequest,
) -> Result<TurnResponse> {
    // 1. Authn.
    authenticate(state, &req)?;

    // 2. Capability detect (C6).
    let platform_ctx: PlatformContext = match &req.device_hints {
        Some(v) => serde_json::from_value(v.clone()).unwrap_or_default(),
        None => PlatformContext::default(),
    };
    let caps = CapabilityDetector::detect(&platform_ctx)?;

    // 3. Context load (C2).
    let mut ctx = state.continuity.get_or_create_context(&req.session_id, &req.user_id).await?;

    // 4. Safety screen (C4) — short-circuits everything else on crisis.
    let verdict = state.safety.screen(&req.user_id, &req.user_input).await;
    if verdict.severity == Severity::Crisis || verdict.requires_crisis_intervention {
        let message = storyline_safety::trigger_crisis_intervention(&req.user_id, &req.user_input);
        ctx.conversation_phase = coerce_transition(ctx.conversation_phase, ConversationPhase::EmotionCheck);
        // Never persist the raw input alongside a crisis event (§4.4, §8 property 5).
        state.continuity.push_turn(&mut ctx, Speaker::User, "[redacted: safety screen]");
        state.continuity.push_turn(&mut ctx, Speaker::Assistant, &message);
        state.continuity.save_context(&mut ctx).await?;
        let base = BaseResponse { text: message, ssml: None, choices: Vec::new(), image_url: None, video_url: None };
        let adapted = storyline_capability::adapt_response(&base, &caps);
        return Ok(TurnResponse {
            success: true,
            speech_text: Some(adapted.text.clone()),
            adapted_response: Some(adapted),
            phase: Some(ctx.conversation_phase),
            ..Default::default()
        });
    }

    // 6. Intent classify (C3).
    let recent: Vec<String> = ctx.conversation_history.iter().rev().take(3).map(|t| t.content.clone()).collect();
    let classified = state.intent_classifier.classify(&req.user_input, ctx.conversation_phase, &recent).await;
    let intent = classified.intent;

    // 5 + 7. Consent (under-13) and quota gate — both live in C5 and both
    // only apply to story-mutating intents, since quota tracks story
    // creation specifically (see DESIGN.md Open Question 1). The auth check
    // right below is a separate, wider allowlist.
    if is_story_mutating(intent) {
        let user = state
            .store
            .get_user(&req.user_id)?
            .ok_or_else(|| StorylineError::Unauthenticated(format!("no user record for {}", req.user_id)))?;

        if storyline_quota::QuotaGate::requires_consent(user.age) {
            let consent = state.quota.consent_status(&req.user_id).await?;
            if !consent.verified {
                if let Some(phone) = &user.parent_phone {
                    state.quota.issue_verification_code(&req.user_id, phone);
                }
                return Ok(TurnResponse::blocked(
                    "Let's get a grown-up to say it's okay first — I've sent them a text!",
                    ctx.conversation_phase,
                ));
            }
        }

        let quota_result = state.quota.check_story_creation(&req.user_id, req.test_mode)?;
        if quota_result.limit_reached {
            if storyline_quota::QuotaGate::requires_consent(user.age) {
                if let Some(phone) = &user.parent_phone {
                    state.quota.issue_verification_code(&req.user_id, phone);
                }
            }
            return Ok(TurnResponse::blocked(
                quota_result.message.unwrap_or_else(|| "You've reached this month's story limit.".to_string()),
                ctx.conversation_phase,
            ));
        }
    }

    if requires_auth(intent) && req.auth_token.is_empty() {
        return Err(StorylineError::Unauthorized(format!("{intent} requires authentication")));
    }

    // 8. Dispatch.
    let response = if is_long_running(intent) {
        dispatch_long_running(state, &req, &ctx).await?
    } else {
        let base = dispatch_sync(dispatcher, intent, &req).await?;
        SyncResult::Base(base)
    };

    // 9. Context update.
    let derived_phase = classified
        .suggested_phase
        .unwrap_or_else(|| derive_phase(intent, ctx.conversation_phase));
    ctx.conversation_phase = coerce_transition(ctx.conversation_phase, derived_phase);
    ctx.last_intent = Some(intent.to_string());
    state.continuity.push_turn(&mut ctx, Speaker::User, &req.user_input);

    let final_response = match response {
        SyncResult::Base(base) => {
            state.continuity.push_turn(&mut ctx, Speaker::Assistant, &base.text);
            state.continuity.save_context(&mut ctx).await?;
            // 10. Compose adapted response (C6 adaptor).
            let adapted = storyline_capability::adapt_response(&base, &caps);
            TurnResponse {
                success: true,
                speech_text: Some(adapted.text.clone()),
                choices: Some(adapted.choices.clone()),
                adapted_response: Some(adapted),
                phase: Some(ctx.conversation_phase),
                ..Default::default()
            }
        }
        SyncResult::Job { job_id, story_id } => {
            state.continuity.push_turn(&mut ctx, Speaker::Assistant, "Your story is being put together now.");
            ctx.story_id = Some(story_id.clone());
            state.continuity.save_context(&mut ctx).await?;
            state.quota.record_story_created(&req.user_id)?;
            TurnResponse {
                success: true,
                job_id: Some(job_id),
                status: Some("generating"),
                realtime_channel: Some(format!("stories:id={story_id}")),
                subscribe_pattern: Some(SubscribePattern {
                    table: "stories",
                    filter: format!("id=eq.{story_id}"),
                    event: "UPDATE",
                }),
                phase: Some(ctx.conversation_phase),
                ..Default::default()
            }
        }
    };

    info!(user_id = %req.user_id, session_id = %req.session_id, intent = %intent, "turn completed");
    Ok(final_response)
}

enum SyncResult {
    Base(BaseResponse),
    Job { job_id: String, story_id: String },
}

fn authenticate(state: &AppState, req: &TurnRequest) -> Result<()> {
    match &state.config.server.auth_token {
        Some(expected) if expected != &req.auth_token => {
            Err(StorylineError::Unauthenticated("token mismatch".to_string()))
        }
        _ => Ok(()),
    }
}

async fn dispatch_sync(
    dispatcher: &dyn SyncAgentDispatcher,
    intent: Intent,
    req: &TurnRequest,
) -> Result<BaseResponse> {
    let rpc = SyncAgentRequest {
        action: action_for(intent),
        user_id: req.user_id.clone(),
        session_id: req.session_id.clone(),
        parameters: serde_json::json!({ "utterance": req.user_input }),
    };
    dispatcher
        .dispatch(target_agent(intent), &rpc)
        .await
        .map_err(|e| StorylineError::ExternalAgentError(e.to_string()))
}

async fn dispatch_long_running(
    state: &AppState,
    req: &TurnRequest,
    ctx: &storyline_continuity::EnhancedConversationContext,
) -> Result<SyncResult> {
    let story_id = uuid::Uuid::now_v7().to_string();
    state.store.create_story(&story_id, &req.user_id, None)?;
    let create_req = storyline_jobs::CreateJobRequest {
        user_id: req.user_id.clone(),
        session_id: req.session_id.clone(),
        job_type: storyline_store::types::AsyncJobType::StoryGeneration,
        request_data: serde_json::json!({ "utterance": req.user_input, "story_type": ctx.story_type }),
        priority: storyline_store::types::JobPriority::Normal,
    };
    let job = state.jobs.create_job(create_req, Some(&story_id)).await?;
    warn!(job_id = %job.job_id, story_id = %story_id, "story generation job enqueued");
    Ok(SyncResult::Job { job_id: job.job_id, story_id })
}

/// Maps a classified intent onto the phase it advances the conversation
/// toward (§4.7, §3 `conversationPhase` transitions). Illegal jumps are
/// coerced by `phase::coerce_transition`, not here.
fn derive_phase(intent: Intent, current: ConversationPhase) -> ConversationPhase {
    match intent {
        Intent::CreateStory | Intent::CreateCharacter => ConversationPhase::CharacterCreation,
        Intent::ConfirmCharacter | Intent::ContinueStory => ConversationPhase::StoryBuilding,
        Intent::EditStory | Intent::EditCharacter => ConversationPhase::StoryEditing,
        Intent::FinishStory => ConversationPhase::AssetGeneration,
        Intent::EmotionCheckin | Intent::MoodUpdate => ConversationPhase::EmotionCheck,
        Intent::Greeting
        | Intent::ViewLibrary
        | Intent::ShareStory
        | Intent::DeleteStory
        | Intent::SubscriptionManagement
        | Intent::ConnectHue
        | Intent::HueStatus
        | Intent::ControlLights
        | Intent::StartConversation
        | Intent::ContinueConversation
        | Intent::EndConversation
        | Intent::ResumeConversation
        | Intent::AccountLinking
        | Intent::Unknown => current,
    }
}

#[allow(dead_code)]
fn effective_tier_hint(tier: Tier) -> &'static str {
    match tier {
        Tier::Premium => "unlimited",
        _ => "capped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::NoopSyncAgentDispatcher;
    use storyline_continuity::ContinuityManager;
    use storyline_core::config::StorylineConfig;
    use storyline_intent::IntentClassifier;
    use storyline_jobs::JobManager;
    use storyline_llm::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
    use storyline_quota::QuotaGate;
    use storyline_safety::SafetyModerator;
    use storyline_store::{InMemoryKvCache, RowStore};

    struct DumbProvider;
    #[async_trait::async_trait]
    impl LlmProvider for DumbProvider {
        fn name(&self) -> &str {
            "dumb"
        }
        async fn send(&self, _req: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
            Err(ProviderError::Unavailable("no provider in tests".into()))
        }
    }

    fn test_state() -> AppState {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        storyline_store::db::init_db(&conn).unwrap();
        let store = Arc::new(RowStore::new(conn));
        let kv: Arc<dyn storyline_store::KvCache> = Arc::new(InMemoryKvCache::new());
        let provider = Arc::new(DumbProvider);
        let mut config = StorylineConfig::default();
        config.server.auth_token = None;

        AppState::new(
            config,
            store.clone(),
            kv.clone(),
            ContinuityManager::new(
                kv.clone(),
                store.clone(),
                "test",
                std::collections::HashMap::new(),
                None,
                3600,
                20,
                10,
                2048,
            ),
            IntentClassifier::new(provider.clone(), "m"),
            SafetyModerator::new(provider.clone(), "m"),
            QuotaGate::new(store.clone(), kv.clone(), "test"),
            JobManager::new(store.clone(), Arc::new(storyline_jobs::NoopDispatcher)),
            None,
        )
    }

    fn seed_user(state: &AppState, age: Option<u32>) {
        let now = chrono::Utc::now().to_rfc3339();
        state
            .store
            .upsert_user(&storyline_store::types::UserRow {
                id: "u1".to_string(),
                age,
                parent_phone: Some("+15550001111".to_string()),
                test_mode_authorized: false,
                smart_home_connected: false,
                tier: "individual".to_string(),
                monthly_story_count: 0,
                monthly_reset_period: chrono::Utc::now().format("%Y-%m").to_string(),
                has_created_first_story: false,
                created_at: now.clone(),
                updated_at: now,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn crisis_keyword_short_circuits_and_redacts_history() {
        let state = test_state();
        seed_user(&state, Some(35));
        let req = TurnRequest {
            user_id: "u1".into(),
            session_id: "s1".into(),
            channel: storyline_core::types::Channel::Web,
            locale: None,
            user_input: "I want to hurt myself".into(),
            device_hints: None,
            auth_token: String::new(),
            test_mode: false,
        };
        let resp = run_turn(&state, &NoopSyncAgentDispatcher, req).await.unwrap();
        assert!(resp.job_id.is_none());
        let ctx = state.continuity.get_context("s1").await.unwrap().unwrap();
        assert!(ctx.conversation_history.iter().all(|t| !t.content.contains("hurt myself")));
    }

    #[tokio::test]
    async fn under_13_without_consent_blocks_story_creation() {
        let state = test_state();
        seed_user(&state, Some(9));
        let req = TurnRequest {
            user_id: "u1".into(),
            session_id: "s2".into(),
            channel: storyline_core::types::Channel::Web,
            locale: None,
            user_input: "make an adventure story".into(),
            device_hints: None,
            auth_token: String::new(),
            test_mode: false,
        };
        let resp = run_turn(&state, &NoopSyncAgentDispatcher, req).await.unwrap();
        assert!(resp.job_id.is_none());
        assert!(!resp.success);
    }

    #[tokio::test]
    async fn unclassifiable_utterance_still_completes_synchronously() {
        let state = test_state();
        seed_user(&state, Some(35));
        let req = TurnRequest {
            user_id: "u1".into(),
            session_id: "s3".into(),
            channel: storyline_core::types::Channel::Web,
            locale: None,
            user_input: "hello there".into(),
            device_hints: None,
            auth_token: String::new(),
            test_mode: false,
        };
        let resp = run_turn(&state, &NoopSyncAgentDispatcher, req).await.unwrap();
        assert!(resp.success);
        assert!(resp.job_id.is_none());
    }
}
