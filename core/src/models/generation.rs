use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Credits;

/// Lifecycle of a [`GenerationRequest`]. Transitions are monotone from any
/// active state to a terminal state: no variant here can be reached from
/// a terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending,
    Configuring,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl GenerationStatus {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            GenerationStatus::Pending
                | GenerationStatus::Configuring
                | GenerationStatus::Queued
                | GenerationStatus::Running
        )
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GenerationStatus::Pending => "pending",
            GenerationStatus::Configuring => "configuring",
            GenerationStatus::Queued => "queued",
            GenerationStatus::Running => "running",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
            GenerationStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => GenerationStatus::Pending,
            "configuring" => GenerationStatus::Configuring,
            "queued" => GenerationStatus::Queued,
            "running" => GenerationStatus::Running,
            "completed" => GenerationStatus::Completed,
            "failed" => GenerationStatus::Failed,
            "cancelled" => GenerationStatus::Cancelled,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => return None,
        })
    }
}

/// Chat delivery coordinates for the message the Poller updates in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCoords {
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
    pub prompt_message_id: Option<i64>,
    pub language: Option<String>,
}

/// Input-parameter record for one generation request. Fields are `Option` because
/// each model supports a different subset; unsupported-but-present parameters are
/// rejected before a request is persisted (see `pricing::validate_params`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub size: Option<String>,
    pub aspect_ratio: Option<String>,
    pub resolution: Option<String>,
    pub quality: Option<String>,
    pub input_fidelity: Option<String>,
}

/// A user's generation request: one prompt, one model, one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: String,
    pub user_telegram_id: i64,
    pub model_id: i64,
    pub model_key: String,
    pub prompt: String,
    pub params: GenerationParams,
    pub reference_count: i32,
    pub cost: Credits,
    pub status: GenerationStatus,
    pub chat_coords: ChatCoords,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationRequest {
    /// Whether `next` is a legal transition from this request's current
    /// status: any active state may move to any other state; once
    /// terminal, no further transition is legal.
    pub fn can_transition_to(&self, next: GenerationStatus) -> bool {
        self.status.is_active() || self.status == next
    }
}

/// One input reference image supplied with a prompt (0..N per request).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReference {
    pub id: i64,
    pub request_id: String,
    pub url: String,
    pub file_id: Option<String>,
}

/// One output image produced for a request. Deduplicated by URL within a
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub id: i64,
    pub request_id: String,
    pub url: String,
    pub file_id: Option<String>,
}

/// One upstream job backing a request (1..N in general, exactly one in this core).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: i64,
    pub request_id: String,
    pub provider_name: String,
    pub upstream_job_id: String,
    pub job_status: JobStatus,
    pub error_message: Option<String>,
}

/// Records that a user consumed their one-time free generation. At most one
/// per user over the lifetime of the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialUse {
    pub id: i64,
    pub user_telegram_id: i64,
    pub request_id: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_status(status: GenerationStatus) -> GenerationRequest {
        GenerationRequest {
            id: "req-1".into(),
            user_telegram_id: 1,
            model_id: 1,
            model_key: "nano-banana-pro".into(),
            prompt: "a cat".into(),
            params: GenerationParams::default(),
            reference_count: 0,
            cost: Credits::ZERO,
            status,
            chat_coords: ChatCoords::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn active_states_can_transition_to_terminal() {
        let req = request_with_status(GenerationStatus::Running);
        assert!(req.can_transition_to(GenerationStatus::Completed));
        assert!(req.can_transition_to(GenerationStatus::Failed));
    }

    #[test]
    fn terminal_state_cannot_transition_away() {
        let req = request_with_status(GenerationStatus::Completed);
        assert!(!req.can_transition_to(GenerationStatus::Running));
        assert!(!req.can_transition_to(GenerationStatus::Failed));
        // A no-op "transition" back to the same terminal state is allowed (idempotent retries).
        assert!(req.can_transition_to(GenerationStatus::Completed));
    }

    #[test]
    fn status_as_str_round_trips() {
        for s in [
            GenerationStatus::Pending,
            GenerationStatus::Configuring,
            GenerationStatus::Queued,
            GenerationStatus::Running,
            GenerationStatus::Completed,
            GenerationStatus::Failed,
            GenerationStatus::Cancelled,
        ] {
            assert_eq!(GenerationStatus::from_str(s.as_str()), Some(s));
        }
    }
}
