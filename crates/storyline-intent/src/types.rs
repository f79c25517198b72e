use serde::{Deserialize, Serialize};
use storyline_core::types::{ConversationPhase, StoryType};

/// The closed set of intents the router dispatches on (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    CreateStory,
    ContinueStory,
    EditStory,
    FinishStory,
    CreateCharacter,
    EditCharacter,
    ConfirmCharacter,
    ViewLibrary,
    ShareStory,
    DeleteStory,
    EmotionCheckin,
    MoodUpdate,
    SubscriptionManagement,
    ConnectHue,
    HueStatus,
    ControlLights,
    StartConversation,
    ContinueConversation,
    EndConversation,
    ResumeConversation,
    AccountLinking,
    Unknown,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Intent::Greeting => "greeting",
            Intent::CreateStory => "create_story",
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
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Intent {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greeting" => Ok(Intent::Greeting),
            "create_story" => Ok(Intent::CreateStory),
            "continue_story" => Ok(Intent::ContinueStory),
            "edit_story" => Ok(Intent::EditStory),
            "finish_story" => Ok(Intent::FinishStory),
            "create_character" => Ok(Intent::CreateCharacter),
            "edit_character" => Ok(Intent::EditCharacter),
            "confirm_character" => Ok(Intent::ConfirmCharacter),
            "view_library" => Ok(Intent::ViewLibrary),
            "share_story" => Ok(Intent::ShareStory),
            "delete_story" => Ok(Intent::DeleteStory),
            "emotion_checkin" => Ok(Intent::EmotionCheckin),
            "mood_update" => Ok(Intent::MoodUpdate),
            "subscription_management" => Ok(Intent::SubscriptionManagement),
            "connect_hue" => Ok(Intent::ConnectHue),
            "hue_status" => Ok(Intent::HueStatus),
            "control_lights" => Ok(Intent::ControlLights),
            "start_conversation" => Ok(Intent::StartConversation),
            "continue_conversation" => Ok(Intent::ContinueConversation),
            "end_conversation" => Ok(Intent::EndConversation),
            "resume_conversation" => Ok(Intent::ResumeConversation),
            "account_linking" => Ok(Intent::AccountLinking),
            "unknown" => Ok(Intent::Unknown),
            other => Err(format!("unknown intent: {other}")),
        }
    }
}

/// How a classification was produced — callers use this to decide whether
/// to trust a low-confidence result (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Llm,
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    pub intent: Intent,
    pub confidence: f32,
    pub suggested_story_type: Option<StoryType>,
    /// The classifier's own phase suggestion, when it has one (e.g. the
    /// heuristic fallback routing a story keyword through character
    /// creation first). Takes precedence over the static per-intent phase
    /// table when present (§4.3 step 9).
    pub suggested_phase: Option<ConversationPhase>,
    /// Free-form entities pulled out of the utterance (child name, edit
    /// target, etc.) — shape varies by intent, downstream consumers read
    /// what they expect and ignore the rest.
    pub entities: serde_json::Value,
    pub source: ClassificationSource,
}
