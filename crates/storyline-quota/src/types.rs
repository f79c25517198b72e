use serde::{Deserialize, Serialize};
use storyline_core::types::Tier;

/// Monthly story allowance per subscription tier (§4.5). `None` means
/// unlimited (Premium never hits a cap).
pub fn monthly_story_cap(tier: Tier) -> Option<u32> {
    match tier {
        Tier::Free => Some(1),
        Tier::AlexaFree => Some(2),
        Tier::AlexaStarter => Some(10),
        Tier::Individual => Some(30),
        Tier::Family => Some(20),
        Tier::Premium => None,
    }
}

/// First-month bonus stories added to the cap for a user's very first story.
/// Only the lowest tiers get one — it exists to guarantee a free/alexa_free
/// user can complete onboarding without immediately hitting the wall.
pub fn welcome_bonus(tier: Tier) -> u32 {
    match tier {
        Tier::Free => 3,
        Tier::AlexaFree => 5,
        _ => 0,
    }
}

/// Result of `QuotaGate::check_story_limit`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaCheckResult {
    pub limit_reached: bool,
    /// `None` for an unlimited tier.
    pub remaining: Option<u32>,
    pub upgrade_required: bool,
    pub message: Option<String>,
}

/// Persisted alongside the `verified` flag once consent has a history —
/// mirrors the cache's `parentConsent:meta:<userId>` JSON blob (§4.1, §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentMeta {
    pub id: String,
    pub method: String,
    pub consent_at: String,
    pub revoked_at: Option<String>,
    pub revoke_reason: Option<String>,
}

/// A missing cache entry defaults to `verified=false` — silence is never
/// treated as consent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentStatus {
    pub verified: bool,
    pub meta: Option<ConsentMeta>,
}

/// A six-digit code sent to the parent phone of record, either to confirm
/// initial consent or to unlock additional stories once a monthly cap is
/// reached (§4.5). The gate only tracks issuance/confirmation; linking the
/// confirmed code back to a consent record is the caller's job.
#[derive(Debug, Clone)]
pub struct VerificationCode {
    pub user_id: String,
    pub code: String,
    pub phone: String,
    pub issued_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl VerificationCode {
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Granted when a request carries `X-Test-Mode: true` and the user's
/// persisted `test_mode_authorized` flag is set — no other code path grants
/// a bypass (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestModeBypass {
    pub tier: Tier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_match_the_documented_tier_table() {
        assert_eq!(monthly_story_cap(Tier::Free), Some(1));
        assert_eq!(monthly_story_cap(Tier::AlexaFree), Some(2));
        assert_eq!(monthly_story_cap(Tier::AlexaStarter), Some(10));
        assert_eq!(monthly_story_cap(Tier::Individual), Some(30));
        assert_eq!(monthly_story_cap(Tier::Family), Some(20));
        assert_eq!(monthly_story_cap(Tier::Premium), None);
    }

    #[test]
    fn welcome_bonus_only_applies_to_the_lowest_tiers() {
        assert_eq!(welcome_bonus(Tier::Free), 3);
        assert_eq!(welcome_bonus(Tier::AlexaFree), 5);
        assert_eq!(welcome_bonus(Tier::AlexaStarter), 0);
        assert_eq!(welcome_bonus(Tier::Premium), 0);
    }

    #[test]
    fn consent_status_defaults_to_unverified() {
        let status = ConsentStatus::default();
        assert!(!status.verified);
        assert!(status.meta.is_none());
    }

    #[test]
    fn verification_code_expires_at_the_boundary() {
        let now = chrono::Utc::now();
        let code = VerificationCode {
            user_id: "u1".into(),
            code: "123456".into(),
            phone: "+15550001111".into(),
            issued_at: now,
            expires_at: now,
        };
        assert!(code.is_expired(now));
    }
}
