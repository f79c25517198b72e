//! Static intent → agent / auth-requirement tables (§4.3 step 5).

use storyline_intent::Intent;

/// Opaque downstream RPC target. The agents themselves are out of scope
/// (§1) — this is just the routing key the dispatch step uses to pick an
/// action name and invocation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetAgent {
    Auth,
    Content,
    Library,
    Emotion,
    Commerce,
    SmartHome,
    Conversation,
}

/// The story-mutating bucket: creating or progressing a story, plus the
/// character sub-steps that happen on the way there (§4.3, §4.7 step 7).
const STORY_MUTATING: &[Intent] = &[
    Intent::CreateStory,
    Intent::ContinueStory,
    Intent::EditStory,
    Intent::FinishStory,
    Intent::CreateCharacter,
    Intent::EditCharacter,
    Intent::ConfirmCharacter,
];

const LIBRARY: &[Intent] = &[Intent::ViewLibrary, Intent::ShareStory, Intent::DeleteStory];

pub fn target_agent(intent: Intent) -> TargetAgent {
    match intent {
        Intent::AccountLinking => TargetAgent::Auth,
        i if STORY_MUTATING.contains(&i) => TargetAgent::Content,
        i if LIBRARY.contains(&i) => TargetAgent::Library,
        Intent::EmotionCheckin | Intent::MoodUpdate => TargetAgent::Emotion,
        Intent::SubscriptionManagement => TargetAgent::Commerce,
        Intent::ConnectHue | Intent::HueStatus | Intent::ControlLights => TargetAgent::SmartHome,
        Intent::StartConversation
        | Intent::ContinueConversation
        | Intent::EndConversation
        | Intent::ResumeConversation => TargetAgent::Conversation,
        Intent::Greeting | Intent::Unknown => TargetAgent::Content,
        #[allow(unreachable_patterns)]
        _ => unreachable!("all Intent variants are covered by the guards above"),
    }
}

/// The story-mutating bucket, the library bucket, `emotion_checkin`, and
/// `subscription_management` require an authenticated caller (§4.3 step 5).
/// Notably `mood_update` does not — the allowlist names `emotion_checkin`
/// specifically, not the wider emotion bucket.
pub fn requires_auth(intent: Intent) -> bool {
    STORY_MUTATING.contains(&intent)
        || LIBRARY.contains(&intent)
        || matches!(intent, Intent::EmotionCheckin | Intent::SubscriptionManagement)
}

/// Whether this intent mutates story state and therefore must pass the
/// quota gate before dispatch (§4.7 step 7).
pub fn is_story_mutating(intent: Intent) -> bool {
    STORY_MUTATING.contains(&intent)
}

/// Long-running intents are enqueued via C8 `createJob` and return a
/// 202-style job handle; everything else is a synchronous RPC (§4.7 step 8).
pub fn is_long_running(intent: Intent) -> bool {
    matches!(intent, Intent::CreateStory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn story_mutating_intents_require_auth_and_quota() {
        for intent in STORY_MUTATING {
            assert!(requires_auth(*intent));
            assert!(is_story_mutating(*intent));
        }
    }

    #[test]
    fn library_intents_route_to_library_and_require_auth() {
        for intent in LIBRARY {
            assert_eq!(target_agent(*intent), TargetAgent::Library);
            assert!(requires_auth(*intent));
        }
    }

    #[test]
    fn emotion_checkin_requires_auth_but_mood_update_does_not() {
        assert!(requires_auth(Intent::EmotionCheckin));
        assert!(!requires_auth(Intent::MoodUpdate));
        assert_eq!(target_agent(Intent::EmotionCheckin), TargetAgent::Emotion);
        assert_eq!(target_agent(Intent::MoodUpdate), TargetAgent::Emotion);
    }

    #[test]
    fn subscription_management_requires_auth_and_routes_to_commerce() {
        assert!(requires_auth(Intent::SubscriptionManagement));
        assert_eq!(target_agent(Intent::SubscriptionManagement), TargetAgent::Commerce);
    }

    #[test]
    fn smart_home_intents_route_to_smart_home_and_need_no_auth() {
        for intent in [Intent::ConnectHue, Intent::HueStatus, Intent::ControlLights] {
            assert_eq!(target_agent(intent), TargetAgent::SmartHome);
            assert!(!requires_auth(intent));
        }
    }

    #[test]
    fn account_linking_routes_to_auth() {
        assert_eq!(target_agent(Intent::AccountLinking), TargetAgent::Auth);
    }

    #[test]
    fn conversation_lifecycle_intents_route_to_conversation_and_need_no_auth() {
        for intent in [
            Intent::StartConversation,
            Intent::ContinueConversation,
            Intent::EndConversation,
            Intent::ResumeConversation,
        ] {
            assert_eq!(target_agent(intent), TargetAgent::Conversation);
            assert!(!requires_auth(intent));
        }
    }

    #[test]
    fn unknown_routes_to_content_and_needs_no_auth() {
        assert_eq!(target_agent(Intent::Unknown), TargetAgent::Content);
        assert!(!requires_auth(Intent::Unknown));
    }

    #[test]
    fn only_create_story_is_long_running() {
        assert!(is_long_running(Intent::CreateStory));
        assert!(!is_long_running(Intent::ContinueStory));
    }
}
