use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Event, NewEvent};
use crate::store::{EventStore, StoreError};

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn create(&self, new: NewEvent) -> Result<Event, StoreError> {
        let event = sqlx::query_as::<_, Event>(
            "INSERT INTO events (name, starts_at, total_tickets, available_tickets)
             VALUES ($1, $2, $3, $3)
             RETURNING id, name, starts_at, total_tickets, available_tickets,
                       version, created_at, updated_at",
        )
        .bind(&new.name)
        .bind(new.starts_at)
        .bind(new.total_tickets)
        .fetch_one(&self.pool)
        .await?;

        Ok(event)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT id, name, starts_at, total_tickets, available_tickets,
                    version, created_at, updated_at
             FROM events
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn list(&self) -> Result<Vec<Event>, StoreError> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT id, name, starts_at, total_tickets, available_tickets,
                    version, created_at, updated_at
             FROM events
             ORDER BY starts_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}
