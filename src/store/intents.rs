use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{IntentStatus, NewIntent, PurchaseIntent};
use crate::store::{IntentStore, QueueStats, StoreError};

const INTENT_COLUMNS: &str =
    "id, event_id, session_id, quantity, arrival, status, created_at, updated_at";

#[derive(Clone)]
pub struct PgIntentStore {
    pool: PgPool,
}

impl PgIntentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IntentStore for PgIntentStore {
    async fn insert(&self, new: NewIntent) -> Result<PurchaseIntent, StoreError> {
        let result = sqlx::query_as::<_, PurchaseIntent>(&format!(
            "INSERT INTO purchase_intents (event_id, session_id, quantity, arrival, status)
             VALUES ($1, $2, $3, $4, 'WAITING')
             RETURNING {INTENT_COLUMNS}"
        ))
        .bind(new.event_id)
        .bind(&new.session_id)
        .bind(new.quantity)
        .bind(new.arrival)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(intent) => Ok(intent),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::DuplicateActiveIntent)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PurchaseIntent>, StoreError> {
        let intent = sqlx::query_as::<_, PurchaseIntent>(&format!(
            "SELECT {INTENT_COLUMNS} FROM purchase_intents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(intent)
    }

    async fn find_existing_active(
        &self,
        session_id: &str,
        event_id: Uuid,
    ) -> Result<Option<PurchaseIntent>, StoreError> {
        let intent = sqlx::query_as::<_, PurchaseIntent>(&format!(
            "SELECT {INTENT_COLUMNS}
             FROM purchase_intents
             WHERE session_id = $1
               AND event_id = $2
               AND status IN ('WAITING', 'PROCESSING')"
        ))
        .bind(session_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(intent)
    }

    async fn claim(&self, id: Uuid) -> Result<bool, StoreError> {
        let affected = sqlx::query(
            "UPDATE purchase_intents
             SET status = 'PROCESSING', updated_at = NOW()
             WHERE id = $1 AND status = 'WAITING'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected == 1)
    }

    async fn set_status(&self, id: Uuid, status: IntentStatus) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE purchase_intents
             SET status = $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn expire_waiting(&self, id: Uuid) -> Result<bool, StoreError> {
        let affected = sqlx::query(
            "UPDATE purchase_intents
             SET status = 'EXPIRED', updated_at = NOW()
             WHERE id = $1 AND status = 'WAITING'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected == 1)
    }

    async fn next_waiting_for_event(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PurchaseIntent>, StoreError> {
        let intents = sqlx::query_as::<_, PurchaseIntent>(&format!(
            "SELECT {INTENT_COLUMNS}
             FROM purchase_intents
             WHERE event_id = $1 AND status = 'WAITING'
             ORDER BY arrival ASC, id ASC
             LIMIT $2"
        ))
        .bind(event_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(intents)
    }

    async fn events_with_waiting(&self) -> Result<Vec<Uuid>, StoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT event_id FROM purchase_intents WHERE status = 'WAITING'",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn count_ahead(
        &self,
        event_id: Uuid,
        arrival: i64,
        id: Uuid,
    ) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*)
             FROM purchase_intents
             WHERE event_id = $1
               AND status IN ('WAITING', 'PROCESSING')
               AND (arrival < $2 OR (arrival = $2 AND id < $3))",
        )
        .bind(event_id)
        .bind(arrival)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn expire_older_than(&self, arrival_cutoff: i64) -> Result<u64, StoreError> {
        let affected = sqlx::query(
            "UPDATE purchase_intents
             SET status = 'EXPIRED', updated_at = NOW()
             WHERE status = 'WAITING' AND arrival < $1",
        )
        .bind(arrival_cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }

    async fn fail_stalled(&self, updated_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let affected = sqlx::query(
            "UPDATE purchase_intents
             SET status = 'FAILED', updated_at = NOW()
             WHERE status = 'PROCESSING' AND updated_at < $1",
        )
        .bind(updated_before)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }

    async fn stats_by_event(&self, event_id: Uuid) -> Result<QueueStats, StoreError> {
        let rows: Vec<(IntentStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*)
             FROM purchase_intents
             WHERE event_id = $1
             GROUP BY status",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match status {
                IntentStatus::Waiting => stats.waiting = count,
                IntentStatus::Processing => stats.processing = count,
                IntentStatus::Completed => stats.completed = count,
                IntentStatus::Failed => stats.failed = count,
                IntentStatus::Expired => stats.expired = count,
            }
        }

        Ok(stats)
    }
}
