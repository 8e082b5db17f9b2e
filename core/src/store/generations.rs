use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::error::CoreError;
use crate::models::{
    ChatCoords, GenerationJob, GenerationParams, GenerationReference, GenerationRequest,
    GenerationResult, GenerationStatus, JobStatus, TrialUse,
};
use crate::money::Credits;

use super::{fmt_dt, parse_dt, Db};

#[derive(Clone)]
pub struct GenerationRepo {
    db: Db,
}

impl GenerationRepo {
    pub fn new(db: Db) -> Self {
        GenerationRepo { db }
    }

    pub async fn insert(&self, req: GenerationRequest) -> Result<(), CoreError> {
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO generation_requests
                        (id, user_telegram_id, model_id, model_key, prompt,
                         size, aspect_ratio, resolution, quality, input_fidelity,
                         reference_count, cost, status,
                         chat_id, message_id, prompt_message_id, language,
                         created_at, started_at, completed_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
                    params![
                        req.id,
                        req.user_telegram_id,
                        req.model_id,
                        req.model_key,
                        req.prompt,
                        req.params.size,
                        req.params.aspect_ratio,
                        req.params.resolution,
                        req.params.quality,
                        req.params.input_fidelity,
                        req.reference_count,
                        req.cost.0,
                        req.status.as_str(),
                        req.chat_coords.chat_id,
                        req.chat_coords.message_id,
                        req.chat_coords.prompt_message_id,
                        req.chat_coords.language,
                        fmt_dt(req.created_at),
                        req.started_at.map(fmt_dt),
                        req.completed_at.map(fmt_dt),
                    ],
                )?;
                Ok(())
            })
            .await?
    }

    pub async fn find(&self, id: &str) -> Result<Option<GenerationRequest>, CoreError> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, user_telegram_id, model_id, model_key, prompt,
                            size, aspect_ratio, resolution, quality, input_fidelity,
                            reference_count, cost, status,
                            chat_id, message_id, prompt_message_id, language,
                            created_at, started_at, completed_at
                     FROM generation_requests WHERE id = ?1",
                    params![id],
                    row_to_request,
                )
                .optional()
                .map_err(CoreError::from)
            })
            .await?
    }

    /// Count of a user's requests currently in an active [`GenerationStatus`],
    /// used to enforce the per-user concurrency cap in the gateway.
    pub async fn count_active_for_user(&self, user_telegram_id: i64) -> Result<i64, CoreError> {
        self.db
            .with_conn(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM generation_requests
                     WHERE user_telegram_id = ?1
                       AND status IN ('pending','configuring','queued','running')",
                    params![user_telegram_id],
                    |r| r.get(0),
                )?;
                Ok(count)
            })
            .await?
    }

    /// The caller's single active request, if any (`GET
    /// /generations/active`). With `max_parallel_per_user = 1` (the common
    /// case) this is unambiguous; with a higher limit it returns the most
    /// recently created active request.
    pub async fn find_active_for_user(
        &self,
        user_telegram_id: i64,
    ) -> Result<Option<GenerationRequest>, CoreError> {
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, user_telegram_id, model_id, model_key, prompt,
                            size, aspect_ratio, resolution, quality, input_fidelity,
                            reference_count, cost, status,
                            chat_id, message_id, prompt_message_id, language,
                            created_at, started_at, completed_at
                     FROM generation_requests
                     WHERE user_telegram_id = ?1
                       AND status IN ('pending','configuring','queued','running')
                     ORDER BY created_at DESC LIMIT 1",
                    params![user_telegram_id],
                    row_to_request,
                )
                .optional()
                .map_err(CoreError::from)
            })
            .await?
    }

    /// Applies a status transition iff the row's current status is active or
    /// already equals `next` (mirrors [`GenerationRequest::can_transition_to`]
    /// but decided in the same statement as the write to avoid a TOCTOU gap).
    pub async fn transition(
        &self,
        id: &str,
        next: GenerationStatus,
    ) -> Result<bool, CoreError> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                let started_clause = if next == GenerationStatus::Running {
                    ", started_at = COALESCE(started_at, ?3)"
                } else {
                    ""
                };
                let completed_clause = if next.is_terminal() {
                    ", completed_at = ?3"
                } else {
                    ""
                };
                let sql = format!(
                    "UPDATE generation_requests SET status = ?2{started_clause}{completed_clause}
                     WHERE id = ?1 AND (
                         status IN ('pending','configuring','queued','running') OR status = ?2
                     )"
                );
                let now = fmt_dt(Utc::now());
                let changed = conn.execute(&sql, params![id, next.as_str(), now])?;
                Ok(changed > 0)
            })
            .await?
    }

    pub async fn update_chat_coords(
        &self,
        id: &str,
        coords: ChatCoords,
    ) -> Result<(), CoreError> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE generation_requests
                     SET chat_id = ?2, message_id = ?3, prompt_message_id = ?4, language = ?5
                     WHERE id = ?1",
                    params![
                        id,
                        coords.chat_id,
                        coords.message_id,
                        coords.prompt_message_id,
                        coords.language,
                    ],
                )?;
                Ok(())
            })
            .await?
    }

    /// Persists the price actually charged for a request. Called once,
    /// right after the charge is posted to the ledger, so `cost` never
    /// drifts from the amount a later refund needs to reverse.
    pub async fn set_cost(&self, id: &str, cost: Credits) -> Result<(), CoreError> {
        let id = id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE generation_requests SET cost = ?2 WHERE id = ?1",
                    params![id, cost.0],
                )?;
                Ok(())
            })
            .await?
    }

    pub async fn add_reference(
        &self,
        request_id: &str,
        url: &str,
        file_id: Option<&str>,
    ) -> Result<(), CoreError> {
        let request_id = request_id.to_string();
        let url = url.to_string();
        let file_id = file_id.map(str::to_string);
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO generation_references (request_id, url, file_id)
                     VALUES (?1, ?2, ?3)",
                    params![request_id, url, file_id],
                )?;
                Ok(())
            })
            .await?
    }

    pub async fn references(&self, request_id: &str) -> Result<Vec<GenerationReference>, CoreError> {
        let request_id = request_id.to_string();
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, request_id, url, file_id FROM generation_references
                     WHERE request_id = ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![request_id], |r| {
                        Ok(GenerationReference {
                            id: r.get(0)?,
                            request_id: r.get(1)?,
                            url: r.get(2)?,
                            file_id: r.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?
    }

    /// Inserts a result row unless its URL is already recorded for this
    /// request.
    pub async fn add_result_if_new(
        &self,
        request_id: &str,
        url: &str,
        file_id: Option<&str>,
    ) -> Result<bool, CoreError> {
        let request_id = request_id.to_string();
        let url = url.to_string();
        let file_id = file_id.map(str::to_string);
        self.db
            .with_conn(move |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO generation_results (request_id, url, file_id)
                     VALUES (?1, ?2, ?3)",
                    params![request_id, url, file_id],
                )?;
                Ok(changed > 0)
            })
            .await?
    }

    pub async fn results(&self, request_id: &str) -> Result<Vec<GenerationResult>, CoreError> {
        let request_id = request_id.to_string();
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, request_id, url, file_id FROM generation_results
                     WHERE request_id = ?1 ORDER BY id",
                )?;
                let rows = stmt
                    .query_map(params![request_id], |r| {
                        Ok(GenerationResult {
                            id: r.get(0)?,
                            request_id: r.get(1)?,
                            url: r.get(2)?,
                            file_id: r.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?
    }

    pub async fn insert_job(
        &self,
        request_id: &str,
        provider_name: &str,
        upstream_job_id: &str,
    ) -> Result<GenerationJob, CoreError> {
        let request_id = request_id.to_string();
        let provider_name = provider_name.to_string();
        let upstream_job_id = upstream_job_id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT INTO generation_jobs
                        (request_id, provider_name, upstream_job_id, job_status, error_message)
                     VALUES (?1, ?2, ?3, 'queued', NULL)",
                    params![request_id, provider_name, upstream_job_id],
                )?;
                let id = conn.last_insert_rowid();
                Ok(GenerationJob {
                    id,
                    request_id,
                    provider_name,
                    upstream_job_id,
                    job_status: JobStatus::Queued,
                    error_message: None,
                })
            })
            .await?
    }

    pub async fn job_for_request(
        &self,
        request_id: &str,
    ) -> Result<Option<GenerationJob>, CoreError> {
        let request_id = request_id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, request_id, provider_name, upstream_job_id, job_status, error_message
                     FROM generation_jobs WHERE request_id = ?1 ORDER BY id DESC LIMIT 1",
                    params![request_id],
                    row_to_job,
                )
                .optional()
                .map_err(CoreError::from)
            })
            .await?
    }

    pub async fn update_job_status(
        &self,
        job_id: i64,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), CoreError> {
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE generation_jobs SET job_status = ?2, error_message = ?3 WHERE id = ?1",
                    params![job_id, status.as_str(), error_message],
                )?;
                Ok(())
            })
            .await?
    }

    /// Requests stuck in an active state since before `threshold`, for the reaper sweep.
    pub async fn find_stuck(
        &self,
        threshold: chrono::DateTime<Utc>,
    ) -> Result<Vec<GenerationRequest>, CoreError> {
        self.db
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, user_telegram_id, model_id, model_key, prompt,
                            size, aspect_ratio, resolution, quality, input_fidelity,
                            reference_count, cost, status,
                            chat_id, message_id, prompt_message_id, language,
                            created_at, started_at, completed_at
                     FROM generation_requests
                     WHERE status IN ('pending','configuring','queued','running')
                       AND created_at < ?1",
                )?;
                let rows = stmt
                    .query_map(params![fmt_dt(threshold)], row_to_request)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?
    }

    pub async fn has_trial_use(&self, user_telegram_id: i64) -> Result<bool, CoreError> {
        self.db
            .with_conn(move |conn| {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM trial_uses WHERE user_telegram_id = ?1)",
                    params![user_telegram_id],
                    |r| r.get(0),
                )?;
                Ok(exists)
            })
            .await?
    }

    /// Records trial use unless one already exists for this user, returning
    /// whether this call was the one that claimed it.
    pub async fn claim_trial_use(
        &self,
        user_telegram_id: i64,
        request_id: &str,
    ) -> Result<bool, CoreError> {
        let request_id = request_id.to_string();
        let now = Utc::now();
        self.db
            .with_conn(move |conn| {
                let changed = conn.execute(
                    "INSERT INTO trial_uses (user_telegram_id, request_id, created_at)
                     SELECT ?1, ?2, ?3
                     WHERE NOT EXISTS (SELECT 1 FROM trial_uses WHERE user_telegram_id = ?1)",
                    params![user_telegram_id, request_id, fmt_dt(now)],
                )?;
                Ok(changed > 0)
            })
            .await?
    }

    /// Deletes the TrialUse row for `user_telegram_id` iff it is bound to
    /// `request_id` (compensating rollback on failure/cancellation).
    /// A no-op if already removed, so retries and reaper sweeps are safe.
    pub async fn remove_trial_use(
        &self,
        user_telegram_id: i64,
        request_id: &str,
    ) -> Result<(), CoreError> {
        let request_id = request_id.to_string();
        self.db
            .with_conn(move |conn| {
                conn.execute(
                    "DELETE FROM trial_uses WHERE user_telegram_id = ?1 AND request_id = ?2",
                    params![user_telegram_id, request_id],
                )?;
                Ok(())
            })
            .await?
    }

    #[allow(dead_code)]
    pub async fn trial_use_for(&self, user_telegram_id: i64) -> Result<Option<TrialUse>, CoreError> {
        self.db
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT id, user_telegram_id, request_id, created_at FROM trial_uses
                     WHERE user_telegram_id = ?1",
                    params![user_telegram_id],
                    |r| {
                        let created_raw: String = r.get(3)?;
                        Ok(TrialUse {
                            id: r.get(0)?,
                            user_telegram_id: r.get(1)?,
                            request_id: r.get(2)?,
                            created_at: parse_dt(&created_raw).unwrap_or_else(|_| Utc::now()),
                        })
                    },
                )
                .optional()
                .map_err(CoreError::from)
            })
            .await?
    }
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<GenerationRequest> {
    let status_raw: String = row.get(12)?;
    let created_raw: String = row.get(17)?;
    let started_raw: Option<String> = row.get(18)?;
    let completed_raw: Option<String> = row.get(19)?;
    Ok(GenerationRequest {
        id: row.get(0)?,
        user_telegram_id: row.get(1)?,
        model_id: row.get(2)?,
        model_key: row.get(3)?,
        prompt: row.get(4)?,
        params: GenerationParams {
            size: row.get(5)?,
            aspect_ratio: row.get(6)?,
            resolution: row.get(7)?,
            quality: row.get(8)?,
            input_fidelity: row.get(9)?,
        },
        reference_count: row.get(10)?,
        cost: Credits(row.get(11)?),
        status: GenerationStatus::from_str(&status_raw).unwrap_or(GenerationStatus::Failed),
        chat_coords: ChatCoords {
            chat_id: row.get(13)?,
            message_id: row.get(14)?,
            prompt_message_id: row.get(15)?,
            language: row.get(16)?,
        },
        created_at: parse_dt(&created_raw).unwrap_or_else(|_| Utc::now()),
        started_at: started_raw.and_then(|s| parse_dt(&s).ok()),
        completed_at: completed_raw.and_then(|s| parse_dt(&s).ok()),
    })
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<GenerationJob> {
    let status_raw: String = row.get(4)?;
    Ok(GenerationJob {
        id: row.get(0)?,
        request_id: row.get(1)?,
        provider_name: row.get(2)?,
        upstream_job_id: row.get(3)?,
        job_status: JobStatus::from_str(&status_raw).unwrap_or(JobStatus::Failed),
        error_message: row.get(5)?,
    })
}
