use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub total_tickets: i32,
    pub available_tickets: i32,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// An event that has already started is no longer purchasable.
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now
    }
}

/// Fields supplied by the administrator when creating an event.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub total_tickets: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event(starts_at: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            name: "Test Event".to_string(),
            starts_at,
            total_tickets: 100,
            available_tickets: 100,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn future_event_has_not_started() {
        let now = Utc::now();
        assert!(!event(now + Duration::hours(1)).has_started(now));
    }

    #[test]
    fn past_event_has_started() {
        let now = Utc::now();
        assert!(event(now - Duration::hours(1)).has_started(now));
        assert!(event(now).has_started(now));
    }
}
