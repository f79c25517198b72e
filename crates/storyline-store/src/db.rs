use rusqlite::{Connection, Result};

/// Create every table the row store touches. Safe to call on every startup
/// (idempotent, `IF NOT EXISTS` throughout).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_stories_table(conn)?;
    create_asset_generation_jobs_table(conn)?;
    create_async_jobs_table(conn)?;
    create_conversation_sessions_table(conn)?;
    create_users_table(conn)?;
    create_subscriptions_table(conn)?;
    create_invitations_table(conn)?;
    create_smart_home_devices_table(conn)?;
    create_webhook_registrations_table(conn)?;
    Ok(())
}

fn create_stories_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS stories (
            id                              TEXT PRIMARY KEY,
            creator_user_id                 TEXT NOT NULL,
            library_id                      TEXT,
            status                          TEXT NOT NULL DEFAULT 'draft',
            asset_generation_status         TEXT NOT NULL,
            asset_generation_started_at     TEXT,
            asset_generation_completed_at   TEXT,
            hue_extracted_colors            TEXT,
            audio_words                     TEXT,
            audio_blocks                    TEXT,
            created_at                      TEXT NOT NULL,
            updated_at                      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_stories_creator ON stories(creator_user_id);",
    )
}

fn create_asset_generation_jobs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS asset_generation_jobs (
            id              TEXT PRIMARY KEY,
            story_id        TEXT NOT NULL,
            asset_type      TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'queued',
            started_at      TEXT,
            completed_at    TEXT,
            retry_count     INTEGER NOT NULL DEFAULT 0,
            priority        TEXT NOT NULL DEFAULT 'normal',
            error_message   TEXT,
            created_at      TEXT NOT NULL,
            UNIQUE(story_id, asset_type)
        );
        CREATE INDEX IF NOT EXISTS idx_asset_jobs_lease
            ON asset_generation_jobs(status, priority, created_at);",
    )
}

fn create_async_jobs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS async_jobs (
            job_id          TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            session_id      TEXT NOT NULL,
            job_type        TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            request_data    TEXT NOT NULL,
            result_data     TEXT,
            error_message   TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            completed_at    TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_async_jobs_user ON async_jobs(user_id, created_at DESC);",
    )
}

fn create_conversation_sessions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversation_sessions (
            session_id              TEXT PRIMARY KEY,
            user_id                 TEXT NOT NULL,
            parent_session_id       TEXT,
            conversation_phase      TEXT NOT NULL,
            story_id                TEXT,
            character_id            TEXT,
            story_type              TEXT,
            session_chain           TEXT NOT NULL DEFAULT '[]',
            device_history          TEXT NOT NULL DEFAULT '[]',
            story_state             TEXT NOT NULL DEFAULT '{}',
            interruption_state      TEXT,
            user_context            TEXT NOT NULL DEFAULT '{}',
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL,
            expires_at              TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user ON conversation_sessions(user_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON conversation_sessions(expires_at);",
    )
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                          TEXT PRIMARY KEY,
            age                         INTEGER,
            parent_phone                TEXT,
            test_mode_authorized        INTEGER NOT NULL DEFAULT 0,
            smart_home_connected        INTEGER NOT NULL DEFAULT 0,
            tier                        TEXT NOT NULL DEFAULT 'free',
            monthly_story_count         INTEGER NOT NULL DEFAULT 0,
            monthly_reset_period        TEXT NOT NULL,
            has_created_first_story     INTEGER NOT NULL DEFAULT 0,
            created_at                  TEXT NOT NULL,
            updated_at                  TEXT NOT NULL
        );",
    )
}

fn create_subscriptions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            user_id                 TEXT PRIMARY KEY,
            plan_id                 TEXT NOT NULL,
            status                  TEXT NOT NULL,
            current_period_start   TEXT NOT NULL,
            current_period_end     TEXT NOT NULL
        );",
    )
}

fn create_invitations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS invitations (
            id                          TEXT PRIMARY KEY,
            inviter_user_id              TEXT NOT NULL,
            invitee_phone_or_email       TEXT NOT NULL,
            organization_id              TEXT,
            role                        TEXT,
            token                       TEXT,
            library_id                  TEXT,
            expires_at                  TEXT NOT NULL,
            status                      TEXT NOT NULL DEFAULT 'pending'
        );
        CREATE INDEX IF NOT EXISTS idx_invitations_inviter ON invitations(inviter_user_id);",
    )
}

fn create_smart_home_devices_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS smart_home_devices (
            id                     TEXT PRIMARY KEY,
            user_id                TEXT NOT NULL,
            device_type            TEXT NOT NULL,
            room_id                TEXT,
            connection_status      TEXT NOT NULL DEFAULT 'disconnected',
            device_metadata        TEXT NOT NULL DEFAULT '{}',
            last_used_at           TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_devices_user ON smart_home_devices(user_id);",
    )
}

fn create_webhook_registrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS webhook_registrations (
            id              TEXT PRIMARY KEY,
            platform        TEXT NOT NULL,
            target_url      TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );",
    )
}
