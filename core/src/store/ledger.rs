use chrono::Utc;
use rusqlite::params;

use crate::error::CoreError;
use crate::models::{EntryType, LedgerEntry};
use crate::money::Credits;

use super::{fmt_dt, parse_dt, Db};

#[derive(Clone)]
pub struct LedgerRepo {
    db: Db,
}

impl LedgerRepo {
    pub fn new(db: Db) -> Self {
        LedgerRepo { db }
    }

    /// Inserts the entry unless one already exists for
    /// `(user_telegram_id, entry_type, reference_id)`, in one statement.
    /// This is what makes [`crate::ledger::Ledger::post`] idempotent under
    /// retries without a read-then-write race.
    pub async fn post_if_absent(
        &self,
        user_telegram_id: i64,
        amount: Credits,
        entry_type: EntryType,
        reference_id: impl Into<String>,
        description: Option<String>,
    ) -> Result<bool, CoreError> {
        let reference_id = reference_id.into();
        let now = Utc::now();
        self.db
            .with_conn(move |conn| {
                let changed = conn.execute(
                    "INSERT INTO ledger_entries
                        (user_telegram_id, amount, entry_type, reference_id, description, created_at)
                     SELECT ?1, ?2, ?3, ?4, ?5, ?6
                     WHERE NOT EXISTS (
                         SELECT 1 FROM ledger_entries
                         WHERE user_telegram_id = ?1 AND entry_type = ?3 AND reference_id = ?4
                     )",
                    params![
                        user_telegram_id,
                        amount.0,
                        entry_type.as_str(),
                        reference_id,
                        description,
                        fmt_dt(now),
                    ],
                )?;
                Ok(changed > 0)
            })
            .await?
    }

    pub async fn balance(&self, user_telegram_id: i64) -> Result<Credits, CoreError> {
        self.db
            .with_conn(move |conn| {
                let total: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(amount), 0) FROM ledger_entries WHERE user_telegram_id = ?1",
                    params![user_telegram_id],
                    |r| r.get(0),
                )?;
                Ok(Credits(total))
            })
            .await?
    }

    pub async fn entries_for_reference(
        &self,
        user_telegram_id: i64,
        entry_type: EntryType,
        reference_id: &str,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        let reference_id = reference_id.to_string();
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_telegram_id, amount, entry_type, reference_id, description,
                            created_at
                     FROM ledger_entries
                     WHERE user_telegram_id = ?1 AND entry_type = ?2 AND reference_id = ?3",
                )?;
                let rows = stmt
                    .query_map(
                        params![user_telegram_id, entry_type.as_str(), reference_id],
                        row_to_entry,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?
    }

    pub async fn history(
        &self,
        user_telegram_id: i64,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_telegram_id, amount, entry_type, reference_id, description,
                            created_at
                     FROM ledger_entries WHERE user_telegram_id = ?1
                     ORDER BY id DESC LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![user_telegram_id, limit], row_to_entry)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let entry_type_raw: String = row.get(3)?;
    let created_raw: String = row.get(6)?;
    Ok(LedgerEntry {
        id: row.get(0)?,
        user_telegram_id: row.get(1)?,
        amount: Credits(row.get(2)?),
        entry_type: EntryType::from_str(&entry_type_raw).unwrap_or(EntryType::AdminAdjustment),
        reference_id: row.get(4)?,
        description: row.get(5)?,
        created_at: parse_dt(&created_raw).unwrap_or_else(|_| Utc::now()),
    })
}
