use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use storyline_core::types::Tier;
use storyline_store::kv::keys;
use storyline_store::types::UserRow;
use storyline_store::{KvCache, RowStore};

use crate::error::{QuotaError, Result};
use crate::types::{
    monthly_story_cap, welcome_bonus, ConsentMeta, ConsentStatus, QuotaCheckResult,
    TestModeBypass, VerificationCode,
};

const DEFAULT_CODE_TTL_MINUTES: i64 = 10;
/// Consent flags never expire on their own; they're only cleared by an
/// explicit revoke. A long TTL keeps the in-memory cache backend's
/// TTL-everything model happy without pretending consent lapses silently.
const CONSENT_TTL_SECONDS: i64 = 60 * 60 * 24 * 365 * 10;

/// Tier-based story limits plus the under-13 parental-consent check the
/// orchestrator runs before dispatching a story-mutating intent (§4.5).
/// Quota lives in the row store (it tracks a monthly counter); consent
/// lives in the cache (`parentConsent:<userId>` / `parentConsent:meta:<userId>`,
/// §4.1) since it's read on every turn for under-13 users.
pub struct QuotaGate {
    store: Arc<RowStore>,
    kv: Arc<dyn KvCache>,
    key_prefix: String,
    pending_codes: Mutex<Vec<VerificationCode>>,
    code_ttl_minutes: i64,
}

impl QuotaGate {
    pub fn new(store: Arc<RowStore>, kv: Arc<dyn KvCache>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            kv,
            key_prefix: key_prefix.into(),
            pending_codes: Mutex::new(Vec::new()),
            code_ttl_minutes: DEFAULT_CODE_TTL_MINUTES,
        }
    }

    /// `checkStoryLimit` (§4.5): remaining = max(0, cap − used); soft-cap
    /// warning fires when `0 < remaining ≤ ceil(cap·0.2)`.
    pub fn check_story_limit(
        &self,
        tier: Tier,
        used_this_month: u32,
        is_first_story_ever: bool,
    ) -> QuotaCheckResult {
        let bonus = if is_first_story_ever { welcome_bonus(tier) } else { 0 };
        let cap = match monthly_story_cap(tier) {
            None => {
                return QuotaCheckResult {
                    limit_reached: false,
                    remaining: None,
                    upgrade_required: false,
                    message: None,
                }
            }
            Some(c) => c + bonus,
        };

        let remaining = cap.saturating_sub(used_this_month);
        let limit_reached = remaining == 0;
        let soft_cap_threshold = (cap as f64 * 0.2).ceil() as u32;

        let message = if limit_reached {
            Some(
                "You've used up this month's stories. Ask a parent to confirm by text \
                 to unlock more."
                    .to_string(),
            )
        } else if remaining <= soft_cap_threshold {
            Some(format!("Only {remaining} stor{} left this month.", if remaining == 1 { "y" } else { "ies" }))
        } else {
            None
        };

        QuotaCheckResult {
            limit_reached,
            remaining: Some(remaining),
            upgrade_required: limit_reached,
            message,
        }
    }

    /// Effective tier for this request: a test-mode bypass (header +
    /// persisted flag) always wins over the user's real tier.
    pub fn effective_tier(&self, user: &UserRow, test_mode_header: bool) -> Tier {
        match test_mode_bypass(test_mode_header, user) {
            Some(bypass) => bypass.tier,
            None => user.tier.parse().unwrap_or(Tier::Free),
        }
    }

    /// Resets the monthly counter first if the calendar month rolled over,
    /// then runs `check_story_limit` against the persisted user row.
    pub fn check_story_creation(&self, user_id: &str, test_mode_header: bool) -> Result<QuotaCheckResult> {
        let mut user = self
            .store
            .get_user(user_id)?
            .ok_or_else(|| QuotaError::UserNotFound(user_id.to_string()))?;
        self.reset_if_new_period(&mut user)?;

        let tier = self.effective_tier(&user, test_mode_header);
        Ok(self.check_story_limit(tier, user.monthly_story_count, !user.has_created_first_story))
    }

    /// Spend one story credit. Call only once the story row / asset jobs
    /// have actually been created, so a failed creation doesn't burn quota.
    pub fn record_story_created(&self, user_id: &str) -> Result<()> {
        self.store.increment_monthly_story_count(user_id)?;
        Ok(())
    }

    pub fn requires_consent(user_age: Option<u32>) -> bool {
        user_age.map_or(false, |age| age < 13)
    }

    /// A missing cache entry defaults to `verified=false` (§4.5) — consent
    /// is never assumed.
    pub async fn consent_status(&self, user_id: &str) -> Result<ConsentStatus> {
        let verified_key = keys::parent_consent(&self.key_prefix, user_id);
        let verified = match self
            .kv
            .get(&verified_key)
            .await
            .map_err(|e| QuotaError::Cache(e.to_string()))?
        {
            Some(bytes) => bytes == b"verified",
            None => false,
        };

        let meta_key = keys::parent_consent_meta(&self.key_prefix, user_id);
        let meta = match self
            .kv
            .get(&meta_key)
            .await
            .map_err(|e| QuotaError::Cache(e.to_string()))?
        {
            Some(bytes) => Some(serde_json::from_slice::<ConsentMeta>(&bytes)?),
            None => None,
        };

        Ok(ConsentStatus { verified, meta })
    }

    /// Record a parent's decision (confirm or revoke) in the cache.
    pub async fn set_consent(&self, user_id: &str, verified: bool, method: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let verified_key = keys::parent_consent(&self.key_prefix, user_id);
        let value = if verified { b"verified".to_vec() } else { b"revoked".to_vec() };
        self.kv
            .set_ex(&verified_key, CONSENT_TTL_SECONDS, value)
            .await
            .map_err(|e| QuotaError::Cache(e.to_string()))?;

        let meta = ConsentMeta {
            id: uuid::Uuid::now_v7().to_string(),
            method: method.to_string(),
            consent_at: now.clone(),
            revoked_at: if verified { None } else { Some(now) },
            revoke_reason: None,
        };
        let meta_key = keys::parent_consent_meta(&self.key_prefix, user_id);
        self.kv
            .set_ex(&meta_key, CONSENT_TTL_SECONDS, serde_json::to_vec(&meta)?)
            .await
            .map_err(|e| QuotaError::Cache(e.to_string()))?;
        Ok(())
    }

    /// Issue a six-digit code for the parent phone on file. Used both for
    /// first-time consent and for the limit-reached verification handoff.
    /// Replaces any previously-issued, still-pending code for this user.
    pub fn issue_verification_code(&self, user_id: &str, phone: &str) -> String {
        let now = Utc::now();
        let code = format!("{:06}", (now.timestamp_subsec_nanos() % 900_000) + 100_000);
        let entry = VerificationCode {
            user_id: user_id.to_string(),
            code: code.clone(),
            phone: phone.to_string(),
            issued_at: now,
            expires_at: now + Duration::minutes(self.code_ttl_minutes),
        };
        let mut codes = self.pending_codes.lock().unwrap();
        codes.retain(|c| c.user_id != user_id);
        codes.push(entry);
        code
    }

    /// Confirm a code the parent reported back and persist consent.
    pub async fn confirm_verification_code(&self, user_id: &str, code: &str) -> Result<()> {
        let now = Utc::now();
        let matched = {
            let mut codes = self.pending_codes.lock().unwrap();
            let idx = codes
                .iter()
                .position(|c| c.user_id == user_id && c.code == code && !c.is_expired(now));
            idx.map(|i| codes.remove(i))
        };
        match matched {
            Some(_) => {
                self.set_consent(user_id, true, "sms").await?;
                Ok(())
            }
            None => Err(QuotaError::InvalidVerificationCode),
        }
    }

    fn reset_if_new_period(&self, user: &mut UserRow) -> Result<()> {
        let current_period = Utc::now().format("%Y-%m").to_string();
        if user.monthly_reset_period != current_period {
            user.monthly_story_count = 0;
            user.monthly_reset_period = current_period;
            user.updated_at = Utc::now().to_rfc3339();
            self.store.upsert_user(user)?;
        }
        Ok(())
    }
}

/// No other code path may grant a bypass (§4.5): both the header and the
/// persisted flag must agree.
pub fn test_mode_bypass(test_mode_header: bool, user: &UserRow) -> Option<TestModeBypass> {
    if test_mode_header && user.test_mode_authorized {
        Some(TestModeBypass { tier: Tier::Premium })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyline_store::InMemoryKvCache;

    fn store() -> Arc<RowStore> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        storyline_store::db::init_db(&conn).unwrap();
        Arc::new(RowStore::new(conn))
    }

    fn seed_user(store: &RowStore, tier: Tier, age: Option<u32>) -> UserRow {
        let now = Utc::now().to_rfc3339();
        let row = UserRow {
            id: "u1".to_string(),
            age,
            parent_phone: None,
            test_mode_authorized: false,
            smart_home_connected: false,
            tier: tier.to_string(),
            monthly_story_count: 0,
            monthly_reset_period: Utc::now().format("%Y-%m").to_string(),
            has_created_first_story: false,
            created_at: now.clone(),
            updated_at: now,
        };
        store.upsert_user(&row).unwrap();
        row
    }

    fn gate(store: Arc<RowStore>) -> QuotaGate {
        QuotaGate::new(store, Arc::new(InMemoryKvCache::new()), "storyline")
    }

    #[test]
    fn free_tier_gets_welcome_bonus_on_first_story_only() {
        let store = store();
        let g = gate(store);
        // cap 1 + welcome bonus 3 = 4 on the first month.
        let first = g.check_story_limit(Tier::Free, 0, true);
        assert_eq!(first.remaining, Some(4));
        let later = g.check_story_limit(Tier::Free, 0, false);
        assert_eq!(later.remaining, Some(1));
    }

    #[test]
    fn limit_reached_flags_upgrade_required() {
        let store = store();
        let g = gate(store);
        let result = g.check_story_limit(Tier::AlexaStarter, 10, false);
        assert!(result.limit_reached);
        assert!(result.upgrade_required);
        assert_eq!(result.remaining, Some(0));
    }

    #[test]
    fn soft_cap_warning_fires_before_the_limit() {
        let store = store();
        let g = gate(store);
        // cap=10, soft threshold = ceil(10*0.2) = 2; used=8 -> remaining=2.
        let result = g.check_story_limit(Tier::AlexaStarter, 8, false);
        assert!(!result.limit_reached);
        assert!(result.message.is_some());
    }

    #[test]
    fn premium_is_never_limited() {
        let store = store();
        let g = gate(store);
        let result = g.check_story_limit(Tier::Premium, 10_000, false);
        assert!(!result.limit_reached);
        assert_eq!(result.remaining, None);
    }

    #[tokio::test]
    async fn consent_defaults_to_unverified_and_updates_after_code_confirmation() {
        let store = store();
        seed_user(&store, Tier::Free, Some(9));
        let g = gate(store);

        let status = g.consent_status("u1").await.unwrap();
        assert!(!status.verified);

        let code = g.issue_verification_code("u1", "+15550001111");
        g.confirm_verification_code("u1", &code).await.unwrap();

        let status = g.consent_status("u1").await.unwrap();
        assert!(status.verified);
        assert_eq!(status.meta.unwrap().method, "sms");
    }

    #[tokio::test]
    async fn wrong_code_is_rejected() {
        let store = store();
        seed_user(&store, Tier::Free, Some(9));
        let g = gate(store);
        g.issue_verification_code("u1", "+15550001111");
        assert!(g.confirm_verification_code("u1", "000000").await.is_err());
    }

    #[test]
    fn test_mode_bypass_requires_both_header_and_persisted_flag() {
        let mut user = seed_user(&store(), Tier::Free, Some(9));
        assert!(test_mode_bypass(true, &user).is_none());
        user.test_mode_authorized = true;
        assert_eq!(
            test_mode_bypass(true, &user),
            Some(TestModeBypass { tier: Tier::Premium })
        );
        assert!(test_mode_bypass(false, &user).is_none());
    }

    #[test]
    fn consent_required_only_under_thirteen() {
        assert!(QuotaGate::requires_consent(Some(9)));
        assert!(!QuotaGate::requires_consent(Some(13)));
        assert!(!QuotaGate::requires_consent(None));
    }
}
