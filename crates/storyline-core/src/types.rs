use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable user identifier (UUIDv7 — time-sortable for log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A session identifier — one per device/channel conversation slot.
///
/// Unlike `UserId`, a session is not shared across devices; the continuity
/// manager is what stitches several sessions into one logical thread via
/// `parentSessionId` / `sessionChain`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Inbound channel an utterance arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    Voice,
    Web,
    Mobile,
    SmartSpeaker,
    SmartDisplay,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Voice => "voice",
            Channel::Web => "web",
            Channel::Mobile => "mobile",
            Channel::SmartSpeaker => "smart-speaker",
            Channel::SmartDisplay => "smart-display",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Channel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voice" => Ok(Channel::Voice),
            "web" => Ok(Channel::Web),
            "mobile" => Ok(Channel::Mobile),
            "smart-speaker" => Ok(Channel::SmartSpeaker),
            "smart-display" => Ok(Channel::SmartDisplay),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// High-level position in a session's state machine.
///
/// Transition legality is enforced by the orchestrator, not by this type —
/// see `storyline_orchestrator::phase::coerce_transition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    Greeting,
    EmotionCheck,
    CharacterCreation,
    StoryBuilding,
    StoryEditing,
    AssetGeneration,
    Completion,
}

impl Default for ConversationPhase {
    fn default() -> Self {
        ConversationPhase::Greeting
    }
}

impl fmt::Display for ConversationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConversationPhase::Greeting => "greeting",
            ConversationPhase::EmotionCheck => "emotion_check",
            ConversationPhase::CharacterCreation => "character_creation",
            ConversationPhase::StoryBuilding => "story_building",
            ConversationPhase::StoryEditing => "story_editing",
            ConversationPhase::AssetGeneration => "asset_generation",
            ConversationPhase::Completion => "completion",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConversationPhase {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greeting" => Ok(ConversationPhase::Greeting),
            "emotion_check" => Ok(ConversationPhase::EmotionCheck),
            "character_creation" => Ok(ConversationPhase::CharacterCreation),
            "story_building" => Ok(ConversationPhase::StoryBuilding),
            "story_editing" => Ok(ConversationPhase::StoryEditing),
            "asset_generation" => Ok(ConversationPhase::AssetGeneration),
            "completion" => Ok(ConversationPhase::Completion),
            other => Err(format!("unknown conversation phase: {other}")),
        }
    }
}

/// Genre/therapeutic category of a story; drives prompt selection downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryType {
    Adventure,
    Bedtime,
    Birthday,
    Educational,
    FinancialLiteracy,
    LanguageLearning,
    MedicalBravery,
    MentalHealth,
    Milestones,
    Music,
    NewBirth,
    TechReadiness,
    ChildLoss,
    InnerChild,
}

impl StoryType {
    pub const ALL: [StoryType; 14] = [
        StoryType::Adventure,
        StoryType::Bedtime,
        StoryType::Birthday,
        StoryType::Educational,
        StoryType::FinancialLiteracy,
        StoryType::LanguageLearning,
        StoryType::MedicalBravery,
        StoryType::MentalHealth,
        StoryType::Milestones,
        StoryType::Music,
        StoryType::NewBirth,
        StoryType::TechReadiness,
        StoryType::ChildLoss,
        StoryType::InnerChild,
    ];
}

impl fmt::Display for StoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoryType::Adventure => "adventure",
            StoryType::Bedtime => "bedtime",
            StoryType::Birthday => "birthday",
            StoryType::Educational => "educational",
            StoryType::FinancialLiteracy => "financial_literacy",
            StoryType::LanguageLearning => "language_learning",
            StoryType::MedicalBravery => "medical_bravery",
            StoryType::MentalHealth => "mental_health",
            StoryType::Milestones => "milestones",
            StoryType::Music => "music",
            StoryType::NewBirth => "new_birth",
            StoryType::TechReadiness => "tech_readiness",
            StoryType::ChildLoss => "child_loss",
            StoryType::InnerChild => "inner_child",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for StoryType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "adventure" => Ok(StoryType::Adventure),
            "bedtime" => Ok(StoryType::Bedtime),
            "birthday" => Ok(StoryType::Birthday),
            "educational" => Ok(StoryType::Educational),
            "financial_literacy" => Ok(StoryType::FinancialLiteracy),
            "language_learning" => Ok(StoryType::LanguageLearning),
            "medical_bravery" => Ok(StoryType::MedicalBravery),
            "mental_health" => Ok(StoryType::MentalHealth),
            "milestones" => Ok(StoryType::Milestones),
            "music" => Ok(StoryType::Music),
            "new_birth" => Ok(StoryType::NewBirth),
            "tech_readiness" => Ok(StoryType::TechReadiness),
            "child_loss" => Ok(StoryType::ChildLoss),
            "inner_child" => Ok(StoryType::InnerChild),
            other => Err(format!("unknown story type: {other}")),
        }
    }
}

/// Subscription tier — drives the monthly story cap in the quota gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    AlexaFree,
    AlexaStarter,
    Individual,
    Family,
    Premium,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Free => "free",
            Tier::AlexaFree => "alexa_free",
            Tier::AlexaStarter => "alexa_starter",
            Tier::Individual => "individual",
            Tier::Family => "family",
            Tier::Premium => "premium",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Tier {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "alexa_free" => Ok(Tier::AlexaFree),
            "alexa_starter" => Ok(Tier::AlexaStarter),
            "individual" => Ok(Tier::Individual),
            "family" => Ok(Tier::Family),
            "premium" => Ok(Tier::Premium),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_roundtrips() {
        for c in [
            Channel::Voice,
            Channel::Web,
            Channel::Mobile,
            Channel::SmartSpeaker,
            Channel::SmartDisplay,
        ] {
            let s = c.to_string();
            assert_eq!(s.parse::<Channel>().unwrap(), c);
        }
    }

    #[test]
    fn story_type_all_roundtrip() {
        for st in StoryType::ALL {
            assert_eq!(st.to_string().parse::<StoryType>().unwrap(), st);
        }
    }

    #[test]
    fn phase_default_is_greeting() {
        assert_eq!(ConversationPhase::default(), ConversationPhase::Greeting);
    }
}
