use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    Photo,
    Video,
    Document,
    Animation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterTag {
    All,
    Active7d,
    Active30d,
    WithBalance,
    PaidUsers,
    NewUsers7d,
}

impl FilterTag {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterTag::All => "all",
            FilterTag::Active7d => "active_7d",
            FilterTag::Active30d => "active_30d",
            FilterTag::WithBalance => "with_balance",
            FilterTag::PaidUsers => "paid_users",
            FilterTag::NewUsers7d => "new_users_7d",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl BroadcastStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BroadcastStatus::Pending => "pending",
            BroadcastStatus::Running => "running",
            BroadcastStatus::Completed => "completed",
            BroadcastStatus::Cancelled => "cancelled",
            BroadcastStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => BroadcastStatus::Pending,
            "running" => BroadcastStatus::Running,
            "completed" => BroadcastStatus::Completed,
            "cancelled" => BroadcastStatus::Cancelled,
            "failed" => BroadcastStatus::Failed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientStatus {
    Pending,
    Sent,
    Failed,
    Blocked,
}

impl RecipientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pending",
            RecipientStatus::Sent => "sent",
            RecipientStatus::Failed => "failed",
            RecipientStatus::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub url: String,
}

/// An admin-authored fan-out message plus its progress counters.
///
/// `sent_count + failed_count + blocked_count <= total_users` holds at all
/// times; equality triggers `status = completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub id: i64,
    pub admin_telegram_id: i64,
    pub content_type: ContentType,
    pub text: Option<String>,
    pub media_file_id: Option<String>,
    pub button: Option<InlineButton>,
    pub filter_tag: FilterTag,
    pub status: BroadcastStatus,
    pub total_users: i64,
    pub sent_count: i64,
    pub failed_count: i64,
    pub blocked_count: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Broadcast {
    pub fn processed_count(&self) -> i64 {
        self.sent_count + self.failed_count + self.blocked_count
    }

    pub fn is_complete(&self) -> bool {
        self.processed_count() >= self.total_users
    }
}

/// Per-(broadcast, user) delivery outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastRecipient {
    pub id: i64,
    pub broadcast_id: i64,
    pub user_telegram_id: i64,
    pub status: RecipientStatus,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}
