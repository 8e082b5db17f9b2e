//! SQLite schema. One `CREATE TABLE IF NOT EXISTS` per entity in the data model;
//! applied once when a [`super::Db`] is opened, the same convention as the
//! teacher's `SqliteSaver::new`.

use rusqlite::Connection;

pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            telegram_id INTEGER NOT NULL UNIQUE,
            referral_code TEXT NOT NULL,
            referrer_telegram_id INTEGER,
            is_banned INTEGER NOT NULL DEFAULT 0,
            last_active_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS ledger_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_telegram_id INTEGER NOT NULL,
            amount INTEGER NOT NULL,
            entry_type TEXT NOT NULL,
            reference_id TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (user_telegram_id, entry_type, reference_id)
        );
        CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger_entries (user_telegram_id);

        CREATE TABLE IF NOT EXISTS models (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            model_key TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            provider_name TEXT NOT NULL,
            supports_text_to_image INTEGER NOT NULL DEFAULT 0,
            supports_image_to_image INTEGER NOT NULL DEFAULT 0,
            supports_aspect_ratio INTEGER NOT NULL DEFAULT 0,
            supports_size INTEGER NOT NULL DEFAULT 0,
            supports_resolution INTEGER NOT NULL DEFAULT 0,
            supports_quality INTEGER NOT NULL DEFAULT 0,
            supports_reference INTEGER NOT NULL DEFAULT 0,
            size_options TEXT NOT NULL DEFAULT '[]',
            aspect_ratio_options TEXT NOT NULL DEFAULT '[]',
            resolution_options TEXT NOT NULL DEFAULT '[]',
            quality_options TEXT NOT NULL DEFAULT '[]',
            input_fidelity_options TEXT NOT NULL DEFAULT '[]',
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS model_prices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            model_id INTEGER NOT NULL REFERENCES models (id),
            unit_credits INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_model_prices_model ON model_prices (model_id);

        CREATE TABLE IF NOT EXISTS dynamic_prices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            model_key TEXT NOT NULL,
            size TEXT,
            resolution TEXT,
            quality TEXT,
            unit_credits INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_dynamic_prices_key ON dynamic_prices (model_key);

        CREATE TABLE IF NOT EXISTS generation_requests (
            id TEXT PRIMARY KEY,
            user_telegram_id INTEGER NOT NULL,
            model_id INTEGER NOT NULL REFERENCES models (id),
            model_key TEXT NOT NULL,
            prompt TEXT NOT NULL,
            size TEXT,
            aspect_ratio TEXT,
            resolution TEXT,
            quality TEXT,
            input_fidelity TEXT,
            reference_count INTEGER NOT NULL DEFAULT 0,
            cost INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            chat_id INTEGER,
            message_id INTEGER,
            prompt_message_id INTEGER,
            language TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_requests_user ON generation_requests (user_telegram_id);
        CREATE INDEX IF NOT EXISTS idx_requests_status ON generation_requests (status);

        CREATE TABLE IF NOT EXISTS generation_references (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL REFERENCES generation_requests (id),
            url TEXT NOT NULL,
            file_id TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_refs_request ON generation_references (request_id);

        CREATE TABLE IF NOT EXISTS generation_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL REFERENCES generation_requests (id),
            url TEXT NOT NULL,
            file_id TEXT,
            UNIQUE (request_id, url)
        );
        CREATE INDEX IF NOT EXISTS idx_results_request ON generation_results (request_id);

        CREATE TABLE IF NOT EXISTS generation_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL REFERENCES generation_requests (id),
            provider_name TEXT NOT NULL,
            upstream_job_id TEXT NOT NULL,
            job_status TEXT NOT NULL,
            error_message TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_jobs_request ON generation_jobs (request_id);

        CREATE TABLE IF NOT EXISTS trial_uses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_telegram_id INTEGER NOT NULL UNIQUE,
            request_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS broadcasts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            admin_telegram_id INTEGER NOT NULL,
            content_type TEXT NOT NULL,
            text TEXT,
            media_file_id TEXT,
            button_text TEXT,
            button_url TEXT,
            filter_tag TEXT NOT NULL,
            status TEXT NOT NULL,
            total_users INTEGER NOT NULL DEFAULT 0,
            sent_count INTEGER NOT NULL DEFAULT 0,
            failed_count INTEGER NOT NULL DEFAULT 0,
            blocked_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS broadcast_recipients (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            broadcast_id INTEGER NOT NULL REFERENCES broadcasts (id),
            user_telegram_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            error_message TEXT,
            sent_at TEXT,
            UNIQUE (broadcast_id, user_telegram_id)
        );
        CREATE INDEX IF NOT EXISTS idx_recipients_broadcast ON broadcast_recipients (broadcast_id);
        "#,
    )
}
