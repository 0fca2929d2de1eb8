use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle state of a purchase intent.
///
/// Transitions form a DAG: WAITING -> {PROCESSING, EXPIRED},
/// PROCESSING -> {COMPLETED, FAILED, EXPIRED}. Terminal states are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentStatus {
    Waiting,
    Processing,
    Completed,
    Failed,
    Expired,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Waiting => "WAITING",
            IntentStatus::Processing => "PROCESSING",
            IntentStatus::Completed => "COMPLETED",
            IntentStatus::Failed => "FAILED",
            IntentStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IntentStatus::Completed | IntentStatus::Failed | IntentStatus::Expired
        )
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted request to buy `quantity` tickets for an event, ordered by
/// the `arrival` ordinal (microsecond-resolution, monotonic per process;
/// ties across processes break on `id`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PurchaseIntent {
    pub id: Uuid,
    pub event_id: Uuid,
    pub session_id: String,
    pub quantity: i32,
    pub arrival: i64,
    pub status: IntentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseIntent {
    /// Age of the intent relative to its arrival ordinal, in microseconds.
    pub fn age_micros(&self, now_micros: i64) -> i64 {
        now_micros - self.arrival
    }
}

/// Fields needed to persist a new waiting intent.
#[derive(Debug, Clone)]
pub struct NewIntent {
    pub event_id: Uuid,
    pub session_id: String,
    pub quantity: i32,
    pub arrival: i64,
}
