use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::error;

use crate::models::{Event, PurchaseIntent, Ticket};
use crate::store::PgTicketStore;

/// Result of one allocation attempt. A closed sum type: the queue processor
/// decides retry-vs-fail per variant, nothing here is an exception tree.
#[derive(Debug, Clone)]
pub enum AllocationOutcome {
    /// Inventory was decremented and the tickets committed.
    Success { tickets: Vec<Ticket> },
    /// Fewer tickets remain than the intent asked for.
    Insufficient,
    /// The event started before the allocation ran.
    EventPast,
    /// The version guard lost a race; retryable.
    Conflict,
    /// The attempt exceeded its time budget; retryable.
    Timeout,
    /// Anything else. The transaction rolled back, nothing was written.
    Internal(String),
}

impl AllocationOutcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllocationOutcome::Conflict | AllocationOutcome::Timeout)
    }

    /// Stable name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AllocationOutcome::Success { .. } => "SUCCESS",
            AllocationOutcome::Insufficient => "INSUFFICIENT",
            AllocationOutcome::EventPast => "EVENT_PAST",
            AllocationOutcome::Conflict => "CONFLICT",
            AllocationOutcome::Timeout => "TIMEOUT",
            AllocationOutcome::Internal(_) => "INTERNAL",
        }
    }
}

#[async_trait]
pub trait Allocator: Send + Sync {
    /// Attempts to issue the intent's tickets against the event inventory.
    /// Infallible at the signature level; every failure mode is an outcome.
    async fn allocate(&self, intent: &PurchaseIntent) -> AllocationOutcome;
}

/// Transactional allocator over Postgres.
///
/// The event row is the single contended resource: this is the only code
/// path that takes `FOR UPDATE` on events. The version guard backs the lock
/// up — if the guarded decrement matches zero rows the race surfaces as a
/// retryable Conflict instead of oversold inventory.
#[derive(Clone)]
pub struct PgAllocator {
    pool: PgPool,
}

impl PgAllocator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn try_allocate(
        &self,
        intent: &PurchaseIntent,
    ) -> Result<AllocationOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let event = sqlx::query_as::<_, Event>(
            "SELECT id, name, starts_at, total_tickets, available_tickets,
                    version, created_at, updated_at
             FROM events
             WHERE id = $1
             FOR UPDATE",
        )
        .bind(intent.event_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(event) = event else {
            return Ok(AllocationOutcome::Internal(format!(
                "event {} no longer exists",
                intent.event_id
            )));
        };

        if event.available_tickets < intent.quantity {
            return Ok(AllocationOutcome::Insufficient);
        }
        if event.has_started(Utc::now()) {
            return Ok(AllocationOutcome::EventPast);
        }

        let updated = sqlx::query(
            "UPDATE events
             SET available_tickets = available_tickets - $1,
                 version = version + 1,
                 updated_at = NOW()
             WHERE id = $2 AND version = $3",
        )
        .bind(intent.quantity)
        .bind(event.id)
        .bind(event.version)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(AllocationOutcome::Conflict);
        }

        let tickets =
            PgTicketStore::insert_bulk(&mut tx, event.id, intent.id, intent.quantity).await?;

        tx.commit().await?;

        Ok(AllocationOutcome::Success { tickets })
    }
}

#[async_trait]
impl Allocator for PgAllocator {
    async fn allocate(&self, intent: &PurchaseIntent) -> AllocationOutcome {
        match self.try_allocate(intent).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(intent_id = %intent.id, error = ?e, "allocation transaction failed");
                classify_db_error(&e)
            }
        }
    }
}

/// Serialization failures and deadlocks are races worth retrying; anything
/// else rolls back and fails the intent.
fn classify_db_error(e: &sqlx::Error) -> AllocationOutcome {
    if let sqlx::Error::Database(db) = e {
        if let Some(code) = db.code() {
            // 40001 serialization_failure, 40P01 deadlock_detected
            if code == "40001" || code == "40P01" {
                return AllocationOutcome::Conflict;
            }
        }
    }
    AllocationOutcome::Internal(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflict_and_timeout_are_retryable() {
        assert!(AllocationOutcome::Conflict.is_retryable());
        assert!(AllocationOutcome::Timeout.is_retryable());
        assert!(!AllocationOutcome::Insufficient.is_retryable());
        assert!(!AllocationOutcome::EventPast.is_retryable());
        assert!(!AllocationOutcome::Internal("boom".into()).is_retryable());
        assert!(!AllocationOutcome::Success { tickets: vec![] }.is_retryable());
    }

    #[test]
    fn unclassified_db_errors_are_internal() {
        let err = sqlx::Error::PoolTimedOut;
        assert!(matches!(
            classify_db_error(&err),
            AllocationOutcome::Internal(_)
        ));
    }
}
