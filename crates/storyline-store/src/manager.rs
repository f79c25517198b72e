use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::types::*;

/// Owns the row-store connection and implements the generic upsert / select /
/// delete operations the orchestrator, job manager, and quota gate build on
/// (§4.1). Thread-safe: a single SQLite connection behind a mutex, matching
/// the rest of the pack's embedded-database crates.
pub struct RowStore {
    db: Mutex<Connection>,
}

impl RowStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- stories --------------------------------------------------------

    pub fn create_story(
        &self,
        id: &str,
        creator_user_id: &str,
        library_id: Option<&str>,
    ) -> Result<StoryRow> {
        let now = chrono::Utc::now().to_rfc3339();
        let status = AssetGenerationStatus::initial();
        let status_json = serde_json::to_string(&status)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO stories
             (id, creator_user_id, library_id, status, asset_generation_status,
              asset_generation_started_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'draft', ?4, ?5, ?5, ?5)",
            params![id, creator_user_id, library_id, status_json, now],
        )?;
        Ok(StoryRow {
            id: id.to_string(),
            creator_user_id: creator_user_id.to_string(),
            library_id: library_id.map(str::to_string),
            status: "draft".to_string(),
            asset_generation_status: status,
            asset_generation_started_at: Some(now.clone()),
            asset_generation_completed_at: None,
            hue_extracted_colors: None,
            audio_words: None,
            audio_blocks: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn get_story(&self, id: &str) -> Result<StoryRow> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, creator_user_id, library_id, status, asset_generation_status,
                    asset_generation_started_at, asset_generation_completed_at,
                    hue_extracted_colors, audio_words, audio_blocks, created_at, updated_at
             FROM stories WHERE id = ?1",
            params![id],
            row_to_story,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            table: "stories".into(),
            key: id.into(),
        })
    }

    /// Persist a recomputed `AssetGenerationStatus`, stamping completion time
    /// when `overall` reaches a terminal state (§3 invariant).
    pub fn save_asset_generation_status(
        &self,
        story_id: &str,
        status: &AssetGenerationStatus,
    ) -> Result<()> {
        let status_json = serde_json::to_string(status)?;
        let now = chrono::Utc::now().to_rfc3339();
        let completed_at = matches!(
            status.overall,
            AssetOverallStatus::Ready | AssetOverallStatus::Failed
        )
        .then(|| now.clone());
        let conn = self.conn();
        conn.execute(
            "UPDATE stories
             SET asset_generation_status = ?1, updated_at = ?2,
                 asset_generation_completed_at = COALESCE(?3, asset_generation_completed_at)
             WHERE id = ?4",
            params![status_json, now, completed_at, story_id],
        )?;
        Ok(())
    }

    // ---- asset_generation_jobs ------------------------------------------

    /// Create the fixed batch of asset jobs for a freshly generated story
    /// (§4.8.1). Idempotent per `(story_id, asset_type)`.
    pub fn create_asset_jobs(&self, story_id: &str, priority: JobPriority) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.conn();
        for asset_type in AssetType::REQUIRED {
            let id = uuid::Uuid::now_v7().to_string();
            let initial_status = if asset_type == AssetType::Content {
                AssetJobStatus::Generating
            } else {
                AssetJobStatus::Queued
            };
            // `content` begins generating immediately (the content agent
            // claims it first), so it needs a `started_at` stamp right away
            // or the timeout sweeper's `started_at < cutoff` scan would never
            // see it as stuck.
            let started_at = (asset_type == AssetType::Content).then(|| now.clone());
            conn.execute(
                "INSERT OR IGNORE INTO asset_generation_jobs
                 (id, story_id, asset_type, status, started_at, priority, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    story_id,
                    asset_type.to_string(),
                    initial_status.to_string(),
                    started_at,
                    priority.to_string(),
                    now
                ],
            )?;
        }
        Ok(())
    }

    /// Atomically lease up to `batch_size` queued jobs for this worker tick,
    /// ordered by priority then age (§4.8.2). The `UPDATE ... WHERE
    /// status='queued'` round-trip is the CAS: a concurrent worker racing on
    /// the same row simply updates zero rows.
    pub fn lease_queued_asset_jobs(&self, batch_size: usize) -> Result<Vec<AssetJobRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id FROM asset_generation_jobs
             WHERE status = 'queued'
             ORDER BY
                CASE priority WHEN 'urgent' THEN 2 WHEN 'high' THEN 1 ELSE 0 END DESC,
                created_at ASC
             LIMIT ?1",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![batch_size as i64], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);

        let now = chrono::Utc::now().to_rfc3339();
        let mut leased = Vec::with_capacity(ids.len());
        for id in ids {
            let updated = conn.execute(
                "UPDATE asset_generation_jobs
                 SET status = 'generating', started_at = ?1
                 WHERE id = ?2 AND status = 'queued'",
                params![now, id],
            )?;
            if updated == 0 {
                debug!(job_id = %id, "lost lease race to another worker");
                continue;
            }
            let row = conn.query_row(
                "SELECT id, story_id, asset_type, status, started_at, completed_at,
                        retry_count, priority, error_message, created_at
                 FROM asset_generation_jobs WHERE id = ?1",
                params![id],
                row_to_asset_job,
            )?;
            leased.push(row);
        }
        Ok(leased)
    }

    pub fn update_asset_job_status(
        &self,
        job_id: &str,
        status: AssetJobStatus,
        error_message: Option<&str>,
    ) -> Result<AssetJobRow> {
        let now = chrono::Utc::now().to_rfc3339();
        let completed_at =
            matches!(status, AssetJobStatus::Ready | AssetJobStatus::Failed).then(|| now.clone());
        let conn = self.conn();
        conn.execute(
            "UPDATE asset_generation_jobs
             SET status = ?1, error_message = ?2,
                 completed_at = COALESCE(?3, completed_at)
             WHERE id = ?4",
            params![status.to_string(), error_message, completed_at, job_id],
        )?;
        conn.query_row(
            "SELECT id, story_id, asset_type, status, started_at, completed_at,
                    retry_count, priority, error_message, created_at
             FROM asset_generation_jobs WHERE id = ?1",
            params![job_id],
            row_to_asset_job,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            table: "asset_generation_jobs".into(),
            key: job_id.into(),
        })
    }

    pub fn requeue_asset_job(&self, job_id: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE asset_generation_jobs
             SET status = 'queued', retry_count = retry_count + 1, started_at = NULL
             WHERE id = ?1",
            params![job_id],
        )?;
        Ok(())
    }

    /// Jobs stuck `generating` past the timeout (§4.8.3 sweeper).
    pub fn find_stuck_asset_jobs(&self, older_than_iso: &str) -> Result<Vec<AssetJobRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, story_id, asset_type, status, started_at, completed_at,
                    retry_count, priority, error_message, created_at
             FROM asset_generation_jobs
             WHERE status = 'generating' AND started_at < ?1",
        )?;
        let rows = stmt
            .query_map(params![older_than_iso], row_to_asset_job)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    pub fn list_asset_jobs_for_story(&self, story_id: &str) -> Result<Vec<AssetJobRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, story_id, asset_type, status, started_at, completed_at,
                    retry_count, priority, error_message, created_at
             FROM asset_generation_jobs WHERE story_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![story_id], row_to_asset_job)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // ---- async_jobs -------------------------------------------------------

    pub fn create_async_job(
        &self,
        job_id: &str,
        user_id: &str,
        session_id: &str,
        job_type: AsyncJobType,
        request_data: serde_json::Value,
    ) -> Result<AsyncJobRow> {
        let now = chrono::Utc::now().to_rfc3339();
        let request_json = serde_json::to_string(&request_data)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO async_jobs
             (job_id, user_id, session_id, job_type, status, request_data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?6)",
            params![job_id, user_id, session_id, job_type.to_string(), request_json, now],
        )?;
        Ok(AsyncJobRow {
            job_id: job_id.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            job_type,
            status: AsyncJobStatus::Pending,
            request_data,
            result_data: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        })
    }

    pub fn get_async_job(&self, job_id: &str) -> Result<AsyncJobRow> {
        let conn = self.conn();
        conn.query_row(
            "SELECT job_id, user_id, session_id, job_type, status, request_data,
                    result_data, error_message, created_at, updated_at, completed_at
             FROM async_jobs WHERE job_id = ?1",
            params![job_id],
            row_to_async_job,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            table: "async_jobs".into(),
            key: job_id.into(),
        })
    }

    pub fn update_async_job_status(
        &self,
        job_id: &str,
        status: AsyncJobStatus,
        result_data: Option<serde_json::Value>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let completed_at =
            matches!(status, AsyncJobStatus::Ready | AsyncJobStatus::Failed).then(|| now.clone());
        let result_json = result_data.map(|v| serde_json::to_string(&v)).transpose()?;
        let conn = self.conn();
        conn.execute(
            "UPDATE async_jobs
             SET status = ?1, result_data = COALESCE(?2, result_data),
                 error_message = ?3, updated_at = ?4,
                 completed_at = COALESCE(?5, completed_at)
             WHERE job_id = ?6",
            params![status.to_string(), result_json, error_message, now, completed_at, job_id],
        )?;
        Ok(())
    }

    // ---- conversation_sessions -------------------------------------------

    pub fn upsert_session(&self, row: &ConversationSessionRow) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO conversation_sessions
             (session_id, user_id, parent_session_id, conversation_phase, story_id,
              character_id, story_type, session_chain, device_history, story_state,
              interruption_state, user_context, created_at, updated_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(session_id) DO UPDATE SET
                conversation_phase = excluded.conversation_phase,
                story_id = excluded.story_id,
                character_id = excluded.character_id,
                story_type = excluded.story_type,
                session_chain = excluded.session_chain,
                device_history = excluded.device_history,
                story_state = excluded.story_state,
                interruption_state = excluded.interruption_state,
                user_context = excluded.user_context,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at",
            params![
                row.session_id,
                row.user_id,
                row.parent_session_id,
                row.conversation_phase,
                row.story_id,
                row.character_id,
                row.story_type,
                row.session_chain.to_string(),
                row.device_history.to_string(),
                row.story_state.to_string(),
                row.interruption_state.as_ref().map(|v| v.to_string()),
                row.user_context.to_string(),
                row.created_at,
                row.updated_at,
                row.expires_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<ConversationSessionRow>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT session_id, user_id, parent_session_id, conversation_phase, story_id,
                    character_id, story_type, session_chain, device_history, story_state,
                    interruption_state, user_context, created_at, updated_at, expires_at
             FROM conversation_sessions WHERE session_id = ?1",
            params![session_id],
            row_to_session,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn delete_expired_sessions(&self, now_iso: &str) -> Result<usize> {
        let conn = self.conn();
        let deleted = conn.execute(
            "DELETE FROM conversation_sessions WHERE expires_at < ?1",
            params![now_iso],
        )?;
        Ok(deleted)
    }

    // ---- users / subscriptions / invitations / devices -------------------

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRow>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, age, parent_phone, test_mode_authorized, smart_home_connected,
                    tier, monthly_story_count, monthly_reset_period,
                    has_created_first_story, created_at, updated_at
             FROM users WHERE id = ?1",
            params![user_id],
            row_to_user,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn upsert_user(&self, row: &UserRow) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO users
             (id, age, parent_phone, test_mode_authorized, smart_home_connected, tier,
              monthly_story_count, monthly_reset_period, has_created_first_story,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                age = excluded.age,
                parent_phone = excluded.parent_phone,
                test_mode_authorized = excluded.test_mode_authorized,
                smart_home_connected = excluded.smart_home_connected,
                tier = excluded.tier,
                monthly_story_count = excluded.monthly_story_count,
                monthly_reset_period = excluded.monthly_reset_period,
                has_created_first_story = excluded.has_created_first_story,
                updated_at = excluded.updated_at",
            params![
                row.id,
                row.age,
                row.parent_phone,
                row.test_mode_authorized,
                row.smart_home_connected,
                row.tier,
                row.monthly_story_count,
                row.monthly_reset_period,
                row.has_created_first_story,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn increment_monthly_story_count(&self, user_id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "UPDATE users
             SET monthly_story_count = monthly_story_count + 1,
                 has_created_first_story = 1,
                 updated_at = ?1
             WHERE id = ?2",
            params![now, user_id],
        )?;
        Ok(())
    }

    pub fn get_subscription(&self, user_id: &str) -> Result<Option<SubscriptionRow>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT user_id, plan_id, status, current_period_start, current_period_end
             FROM subscriptions WHERE user_id = ?1",
            params![user_id],
            |r| {
                Ok(SubscriptionRow {
                    user_id: r.get(0)?,
                    plan_id: r.get(1)?,
                    status: r.get(2)?,
                    current_period_start: r.get(3)?,
                    current_period_end: r.get(4)?,
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn create_invitation(&self, row: &InvitationRow) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO invitations
             (id, inviter_user_id, invitee_phone_or_email, organization_id, role,
              token, library_id, expires_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.id,
                row.inviter_user_id,
                row.invitee_phone_or_email,
                row.organization_id,
                row.role,
                row.token,
                row.library_id,
                row.expires_at,
                row.status,
            ],
        )?;
        Ok(())
    }

    pub fn get_smart_home_device(&self, device_id: &str) -> Result<Option<SmartHomeDeviceRow>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, user_id, device_type, room_id, connection_status,
                    device_metadata, last_used_at
             FROM smart_home_devices WHERE id = ?1",
            params![device_id],
            row_to_device,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn get_webhook_registration(
        &self,
        platform: &str,
    ) -> Result<Option<WebhookRegistrationRow>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, platform, target_url, created_at
             FROM webhook_registrations WHERE platform = ?1",
            params![platform],
            |r| {
                Ok(WebhookRegistrationRow {
                    id: r.get(0)?,
                    platform: r.get(1)?,
                    target_url: r.get(2)?,
                    created_at: r.get(3)?,
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }
}

fn row_to_story(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoryRow> {
    let status_json: String = row.get(4)?;
    let asset_generation_status: AssetGenerationStatus =
        serde_json::from_str(&status_json).unwrap_or_else(|_| AssetGenerationStatus::initial());
    Ok(StoryRow {
        id: row.get(0)?,
        creator_user_id: row.get(1)?,
        library_id: row.get(2)?,
        status: row.get(3)?,
        asset_generation_status,
        asset_generation_started_at: row.get(5)?,
        asset_generation_completed_at: row.get(6)?,
        hue_extracted_colors: get_json(row, 7)?,
        audio_words: get_json(row, 8)?,
        audio_blocks: get_json(row, 9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn row_to_asset_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<AssetJobRow> {
    let asset_type: String = row.get(2)?;
    let status: String = row.get(3)?;
    let priority: String = row.get(7)?;
    Ok(AssetJobRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        asset_type: asset_type.parse().unwrap_or(AssetType::Content),
        status: status.parse().unwrap_or(AssetJobStatus::Queued),
        started_at: row.get(4)?,
        completed_at: row.get(5)?,
        retry_count: row.get(6)?,
        priority: priority.parse().unwrap_or(JobPriority::Normal),
        error_message: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn row_to_async_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<AsyncJobRow> {
    let job_type: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(AsyncJobRow {
        job_id: row.get(0)?,
        user_id: row.get(1)?,
        session_id: row.get(2)?,
        job_type: job_type.parse().unwrap_or(AsyncJobType::StoryGeneration),
        status: status.parse().unwrap_or(AsyncJobStatus::Pending),
        request_data: get_json(row, 5)?.unwrap_or(serde_json::Value::Null),
        result_data: get_json(row, 6)?,
        error_message: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationSessionRow> {
    Ok(ConversationSessionRow {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        parent_session_id: row.get(2)?,
        conversation_phase: row.get(3)?,
        story_id: row.get(4)?,
        character_id: row.get(5)?,
        story_type: row.get(6)?,
        session_chain: get_json(row, 7)?.unwrap_or(serde_json::json!([])),
        device_history: get_json(row, 8)?.unwrap_or(serde_json::json!([])),
        story_state: get_json(row, 9)?.unwrap_or(serde_json::json!({})),
        interruption_state: get_json(row, 10)?,
        user_context: get_json(row, 11)?.unwrap_or(serde_json::json!({})),
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        expires_at: row.get(14)?,
    })
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        age: row.get(1)?,
        parent_phone: row.get(2)?,
        test_mode_authorized: row.get(3)?,
        smart_home_connected: row.get(4)?,
        tier: row.get(5)?,
        monthly_story_count: row.get(6)?,
        monthly_reset_period: row.get(7)?,
        has_created_first_story: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<SmartHomeDeviceRow> {
    Ok(SmartHomeDeviceRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        device_type: row.get(2)?,
        room_id: row.get(3)?,
        connection_status: row.get(4)?,
        device_metadata: get_json(row, 5)?.unwrap_or(serde_json::json!({})),
        last_used_at: row.get(6)?,
    })
}

fn get_json(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(idx)?;
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RowStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        RowStore::new(conn)
    }

    #[test]
    fn create_and_fetch_story_starts_generating() {
        let store = store();
        let story = store.create_story("s1", "u1", None).unwrap();
        assert_eq!(story.asset_generation_status.overall, AssetOverallStatus::Generating);
        let fetched = store.get_story("s1").unwrap();
        assert_eq!(fetched.id, "s1");
    }

    #[test]
    fn asset_job_lease_is_exclusive() {
        let store = store();
        store.create_story("s1", "u1", None).unwrap();
        store.create_asset_jobs("s1", JobPriority::Normal).unwrap();
        let first = store.lease_queued_asset_jobs(20).unwrap();
        let second = store.lease_queued_asset_jobs(20).unwrap();
        assert!(!first.is_empty());
        assert!(second.is_empty(), "already-leased jobs must not be re-leased");
    }

    #[test]
    fn async_job_roundtrips() {
        let store = store();
        store
            .create_async_job("j1", "u1", "sess1", AsyncJobType::StoryGeneration, serde_json::json!({}))
            .unwrap();
        store
            .update_async_job_status(
                "j1",
                AsyncJobStatus::Ready,
                Some(serde_json::json!({"storyId": "s1"})),
                None,
            )
            .unwrap();
        let job = store.get_async_job("j1").unwrap();
        assert_eq!(job.status, AsyncJobStatus::Ready);
        assert!(job.completed_at.is_some());
    }
}
