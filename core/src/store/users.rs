use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::error::CoreError;
use crate::models::User;

use super::{fmt_dt, parse_dt, Db};

#[derive(Clone)]
pub struct UserRepo {
    db: Db,
}

impl UserRepo {
    pub fn new(db: Db) -> Self {
        UserRepo { db }
    }

    pub async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, CoreError> {
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, telegram_id, referral_code, referrer_telegram_id, is_banned,
                            last_active_at, created_at
                     FROM users WHERE telegram_id = ?1",
                    params![telegram_id],
                    row_to_user,
                )
                .optional()
                .map_err(CoreError::from)
            })
            .await?
    }

    pub async fn find_by_referral_code(&self, code: &str) -> Result<Option<User>, CoreError> {
        let code = code.to_string();
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, telegram_id, referral_code, referrer_telegram_id, is_banned,
                            last_active_at, created_at
                     FROM users WHERE referral_code = ?1",
                    params![code],
                    row_to_user,
                )
                .optional()
                .map_err(CoreError::from)
            })
            .await?
    }

    /// Inserts a new user row, or returns the existing one for `telegram_id`
    /// unchanged. Callers that need "first time seen" semantics should check
    /// the return against their own prior lookup.
    pub async fn get_or_create(
        &self,
        telegram_id: i64,
        referral_code: impl Into<String>,
        referrer_telegram_id: Option<i64>,
    ) -> Result<User, CoreError> {
        let referral_code = referral_code.into();
        let now = Utc::now();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO users (telegram_id, referral_code, referrer_telegram_id,
                                         is_banned, last_active_at, created_at)
                     VALUES (?1, ?2, ?3, 0, ?4, ?4)
                     ON CONFLICT (telegram_id) DO NOTHING",
                    params![telegram_id, referral_code, referrer_telegram_id, fmt_dt(now)],
                )?;
                conn.query_row(
                    "SELECT id, telegram_id, referral_code, referrer_telegram_id, is_banned,
                            last_active_at, created_at
                     FROM users WHERE telegram_id = ?1",
                    params![telegram_id],
                    row_to_user,
                )
                .map_err(CoreError::from)
            })
            .await?
    }

    pub async fn touch_last_active(&self, telegram_id: i64) -> Result<(), CoreError> {
        let now = Utc::now();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE users SET last_active_at = ?2 WHERE telegram_id = ?1",
                    params![telegram_id, fmt_dt(now)],
                )?;
                Ok(())
            })
            .await?
    }

    pub async fn set_banned(&self, telegram_id: i64, banned: bool) -> Result<(), CoreError> {
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE users SET is_banned = ?2 WHERE telegram_id = ?1",
                    params![telegram_id, banned as i64],
                )?;
                Ok(())
            })
            .await?
    }

    /// Telegram ids for users matching a broadcast filter tag. `all` selects
    /// unconditionally active recipients; other tags apply a narrower filter.
    pub async fn telegram_ids_for_filter(&self, filter_tag: &str) -> Result<Vec<i64>, CoreError> {
        let filter_tag = filter_tag.to_string();
        self.db
            .with_conn(move |conn| {
                let now = Utc::now();
                let sql = match filter_tag.as_str() {
                    "active_7d" => {
                        "SELECT telegram_id FROM users WHERE is_banned = 0 AND last_active_at >= ?1"
                    }
                    "active_30d" => {
                        "SELECT telegram_id FROM users WHERE is_banned = 0 AND last_active_at >= ?1"
                    }
                    "new_users_7d" => {
                        "SELECT telegram_id FROM users WHERE is_banned = 0 AND created_at >= ?1"
                    }
                    "with_balance" => {
                        "SELECT u.telegram_id FROM users u WHERE u.is_banned = 0 AND
                         (SELECT COALESCE(SUM(amount), 0) FROM ledger_entries
                          WHERE user_telegram_id = u.telegram_id) > 0"
                    }
                    "paid_users" => {
                        "SELECT DISTINCT u.telegram_id FROM users u
                         JOIN ledger_entries le ON le.user_telegram_id = u.telegram_id
                         WHERE u.is_banned = 0 AND le.entry_type = 'deposit'"
                    }
                    _ => "SELECT telegram_id FROM users WHERE is_banned = 0",
                };
                let cutoff = match filter_tag.as_str() {
                    "active_7d" | "new_users_7d" => fmt_dt(now - chrono::Duration::days(7)),
                    "active_30d" => fmt_dt(now - chrono::Duration::days(30)),
                    _ => fmt_dt(now),
                };
                let mut stmt = conn.prepare(sql)?;
                let needs_cutoff = matches!(
                    filter_tag.as_str(),
                    "active_7d" | "active_30d" | "new_users_7d"
                );
                let rows = if needs_cutoff {
                    stmt.query_map(params![cutoff], |r| r.get::<_, i64>(0))?
                        .collect::<Result<Vec<_>, _>>()?
                } else {
                    stmt.query_map([], |r| r.get::<_, i64>(0))?
                        .collect::<Result<Vec<_>, _>>()?
                };
                Ok(rows)
            })
            .await?
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let last_active_raw: String = row.get(5)?;
    let created_raw: String = row.get(6)?;
    Ok(User {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        referral_code: row.get(2)?,
        referrer_telegram_id: row.get(3)?,
        is_banned: row.get::<_, i64>(4)? != 0,
        last_active_at: parse_dt(&last_active_raw).unwrap_or_else(|_| Utc::now()),
        created_at: parse_dt(&created_raw).unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let db = Db::open_in_memory().unwrap();
        let repo = UserRepo::new(db);
        let a = repo.get_or_create(42, "ref-abc", None).await.unwrap();
        let b = repo.get_or_create(42, "ref-xyz", None).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.referral_code, "ref-abc");
    }

    #[tokio::test]
    async fn find_by_referral_code_round_trips() {
        let db = Db::open_in_memory().unwrap();
        let repo = UserRepo::new(db);
        repo.get_or_create(7, "friendly-otter", None).await.unwrap();
        let found = repo
            .find_by_referral_code("friendly-otter")
            .await
            .unwrap()
            .expect("user present");
        assert_eq!(found.telegram_id, 7);
    }
}
