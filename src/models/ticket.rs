use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single issued ticket. Tickets are fungible; `purchase_id` groups all
/// tickets issued by one purchase intent and equals that intent's id.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub purchase_id: Uuid,
    pub issued_at: DateTime<Utc>,
}
