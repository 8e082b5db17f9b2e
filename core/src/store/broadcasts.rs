use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::error::CoreError;
use crate::models::{
    Broadcast, BroadcastStatus, ContentType, FilterTag, InlineButton, RecipientStatus,
};

use super::{fmt_dt, parse_dt, Db};

#[derive(Clone)]
pub struct BroadcastRepo {
    db: Db,
}

impl BroadcastRepo {
    pub fn new(db: Db) -> Self {
        BroadcastRepo { db }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        admin_telegram_id: i64,
        content_type: ContentType,
        text: Option<String>,
        media_file_id: Option<String>,
        button: Option<InlineButton>,
        filter_tag: FilterTag,
        total_users: i64,
    ) -> Result<Broadcast, CoreError> {
        let now = Utc::now();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO broadcasts
                        (admin_telegram_id, content_type, text, media_file_id,
                         button_text, button_url, filter_tag, status,
                         total_users, sent_count, failed_count, blocked_count,
                         created_at, started_at, completed_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,'pending',?8,0,0,0,?9,NULL,NULL)",
                    params![
                        admin_telegram_id,
                        content_type_str(content_type),
                        text,
                        media_file_id,
                        button.as_ref().map(|b| b.text.clone()),
                        button.as_ref().map(|b| b.url.clone()),
                        filter_tag.as_str(),
                        total_users,
                        fmt_dt(now),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                Ok(Broadcast {
                    id,
                    admin_telegram_id,
                    content_type,
                    text,
                    media_file_id,
                    button,
                    filter_tag,
                    status: BroadcastStatus::Pending,
                    total_users,
                    sent_count: 0,
                    failed_count: 0,
                    blocked_count: 0,
                    created_at: now,
                    started_at: None,
                    completed_at: None,
                })
            })
            .await?
    }

    pub async fn find(&self, id: i64) -> Result<Option<Broadcast>, CoreError> {
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, admin_telegram_id, content_type, text, media_file_id,
                            button_text, button_url, filter_tag, status,
                            total_users, sent_count, failed_count, blocked_count,
                            created_at, started_at, completed_at
                     FROM broadcasts WHERE id = ?1",
                    params![id],
                    row_to_broadcast,
                )
                .optional()
                .map_err(CoreError::from)
            })
            .await?
    }

    pub async fn set_status(&self, id: i64, status: BroadcastStatus) -> Result<(), CoreError> {
        let now = Utc::now();
        self.db
            .with_conn(move |conn| {
                let sql = match status {
                    BroadcastStatus::Running => {
                        "UPDATE broadcasts SET status = ?2, started_at = COALESCE(started_at, ?3) WHERE id = ?1"
                    }
                    BroadcastStatus::Completed | BroadcastStatus::Cancelled | BroadcastStatus::Failed => {
                        "UPDATE broadcasts SET status = ?2, completed_at = ?3 WHERE id = ?1"
                    }
                    BroadcastStatus::Pending => "UPDATE broadcasts SET status = ?2 WHERE id = ?1",
                };
                conn.execute(sql, params![id, status.as_str(), fmt_dt(now)])?;
                Ok(())
            })
            .await?
    }

    pub async fn seed_recipients(&self, id: i64, telegram_ids: Vec<i64>) -> Result<(), CoreError> {
        self.db
            .with_conn(move |conn| {
                let tx = conn.unchecked_transaction()?;
                for telegram_id in telegram_ids {
                    tx.execute(
                        "INSERT OR IGNORE INTO broadcast_recipients
                            (broadcast_id, user_telegram_id, status, error_message, sent_at)
                         VALUES (?1, ?2, 'pending', NULL, NULL)",
                        params![id, telegram_id],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?
    }

    pub async fn pending_recipients(
        &self,
        broadcast_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>, CoreError> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_telegram_id FROM broadcast_recipients
                     WHERE broadcast_id = ?1 AND status = 'pending' LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![broadcast_id, limit], |r| r.get::<_, i64>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?
    }

    pub async fn list(&self, limit: i64) -> Result<Vec<Broadcast>, CoreError> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, admin_telegram_id, content_type, text, media_file_id,
                            button_text, button_url, filter_tag, status,
                            total_users, sent_count, failed_count, blocked_count,
                            created_at, started_at, completed_at
                     FROM broadcasts ORDER BY id DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit], row_to_broadcast)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?
    }

    /// Records one recipient's delivery outcome and atomically bumps the
    /// matching broadcast counter in the same statement, so concurrent
    /// delivery workers never race on a read-modify-write of the counters.
    pub async fn record_outcome(
        &self,
        broadcast_id: i64,
        user_telegram_id: i64,
        status: RecipientStatus,
        error_message: Option<String>,
    ) -> Result<(), CoreError> {
        let now = Utc::now();
        self.db
            .with_conn(move |conn| {
                let tx = conn.unchecked_transaction()?;
                tx.execute(
                    "UPDATE broadcast_recipients
                     SET status = ?3, error_message = ?4, sent_at = ?5
                     WHERE broadcast_id = ?1 AND user_telegram_id = ?2",
                    params![
                        broadcast_id,
                        user_telegram_id,
                        status.as_str(),
                        error_message,
                        fmt_dt(now),
                    ],
                )?;
                let column = match status {
                    RecipientStatus::Sent => "sent_count",
                    RecipientStatus::Failed => "failed_count",
                    RecipientStatus::Blocked => "blocked_count",
                    RecipientStatus::Pending => return Ok(()),
                };
                tx.execute(
                    &format!("UPDATE broadcasts SET {column} = {column} + 1 WHERE id = ?1"),
                    params![broadcast_id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?
    }
}

fn content_type_str(c: ContentType) -> &'static str {
    match c {
        ContentType::Text => "text",
        ContentType::Photo => "photo",
        ContentType::Video => "video",
        ContentType::Document => "document",
        ContentType::Animation => "animation",
    }
}

fn content_type_from_str(s: &str) -> ContentType {
    match s {
        "photo" => ContentType::Photo,
        "video" => ContentType::Video,
        "document" => ContentType::Document,
        "animation" => ContentType::Animation,
        _ => ContentType::Text,
    }
}

fn row_to_broadcast(row: &rusqlite::Row<'_>) -> rusqlite::Result<Broadcast> {
    let content_type_raw: String = row.get(2)?;
    let filter_tag_raw: String = row.get(7)?;
    let status_raw: String = row.get(8)?;
    let created_raw: String = row.get(13)?;
    let started_raw: Option<String> = row.get(14)?;
    let completed_raw: Option<String> = row.get(15)?;
    let button_text: Option<String> = row.get(5)?;
    let button_url: Option<String> = row.get(6)?;
    Ok(Broadcast {
        id: row.get(0)?,
        admin_telegram_id: row.get(1)?,
        content_type: content_type_from_str(&content_type_raw),
        text: row.get(3)?,
        media_file_id: row.get(4)?,
        button: match (button_text, button_url) {
            (Some(text), Some(url)) => Some(InlineButton { text, url }),
            _ => None,
        },
        filter_tag: filter_tag_from_str(&filter_tag_raw),
        status: BroadcastStatus::from_str(&status_raw).unwrap_or(BroadcastStatus::Failed),
        total_users: row.get(9)?,
        sent_count: row.get(10)?,
        failed_count: row.get(11)?,
        blocked_count: row.get(12)?,
        created_at: parse_dt(&created_raw).unwrap_or_else(|_| Utc::now()),
        started_at: started_raw.and_then(|s| parse_dt(&s).ok()),
        completed_at: completed_raw.and_then(|s| parse_dt(&s).ok()),
    })
}

fn filter_tag_from_str(s: &str) -> FilterTag {
    match s {
        "active_7d" => FilterTag::Active7d,
        "active_30d" => FilterTag::Active30d,
        "with_balance" => FilterTag::WithBalance,
        "paid_users" => FilterTag::PaidUsers,
        "new_users_7d" => FilterTag::NewUsers7d,
        _ => FilterTag::All,
    }
}
