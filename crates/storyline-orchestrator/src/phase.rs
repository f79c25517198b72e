//! `conversationPhase` transition legality (§4.7 state-machine invariants).

use storyline_core::types::ConversationPhase;
use tracing::warn;

/// Legal target phases for each source phase. `completion` only ever goes
/// back to `greeting` — there is no terminal phase in this conversation.
fn allowed_targets(from: ConversationPhase) -> &'static [ConversationPhase] {
    use ConversationPhase::*;
    match from {
        Greeting => &[EmotionCheck, CharacterCreation, StoryBuilding],
        EmotionCheck => &[CharacterCreation, StoryBuilding, Greeting],
        CharacterCreation => &[StoryBuilding, CharacterCreation],
        StoryBuilding => &[StoryEditing, AssetGeneration, StoryBuilding],
        StoryEditing => &[AssetGeneration, StoryBuilding],
        AssetGeneration => &[Completion, StoryEditing],
        Completion => &[Greeting],
    }
}

/// Coerce a classifier-requested transition to a legal one. An illegal
/// request is coerced back to `from` and logged as an anomaly rather than
/// rejected outright — the turn still completes, just without advancing
/// phase (§4.7).
pub fn coerce_transition(from: ConversationPhase, requested: ConversationPhase) -> ConversationPhase {
    if requested == from || allowed_targets(from).contains(&requested) {
        requested
    } else {
        warn!(from = %from, requested = %requested, "illegal conversationPhase transition coerced back to source phase");
        from
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConversationPhase::*;

    #[test]
    fn greeting_can_advance_to_story_building() {
        assert_eq!(coerce_transition(Greeting, StoryBuilding), StoryBuilding);
    }

    #[test]
    fn completion_only_returns_to_greeting() {
        assert_eq!(coerce_transition(Completion, Greeting), Greeting);
        assert_eq!(coerce_transition(Completion, StoryBuilding), Completion);
    }

    #[test]
    fn illegal_jump_is_coerced_back_to_source() {
        assert_eq!(coerce_transition(Greeting, AssetGeneration), Greeting);
    }

    #[test]
    fn self_transition_is_always_legal() {
        for phase in [Greeting, EmotionCheck, CharacterCreation, StoryBuilding, StoryEditing, AssetGeneration, Completion] {
            assert_eq!(coerce_transition(phase, phase), phase);
        }
    }
}
