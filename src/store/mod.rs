use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Event, IntentStatus, NewEvent, NewIntent, PurchaseIntent, Ticket};

pub mod events;
pub mod intents;
pub mod tickets;

#[cfg(test)]
pub mod memory;

pub use events::PgEventStore;
pub use intents::PgIntentStore;
pub use tickets::PgTicketStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The partial unique index on (session_id, event_id) rejected a second
    /// live intent for the same buyer and event.
    #[error("an active intent already exists for this session and event")]
    DuplicateActiveIntent,

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

/// Per-event intent counts grouped by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub waiting: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub expired: i64,
}

impl QueueStats {
    pub fn total_active(&self) -> i64 {
        self.waiting + self.processing
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persists a new event with `available_tickets = total_tickets` and
    /// `version = 1`.
    async fn create(&self, new: NewEvent) -> Result<Event, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Event>, StoreError>;

    async fn list(&self) -> Result<Vec<Event>, StoreError>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn find_by_purchase(&self, purchase_id: Uuid) -> Result<Vec<Ticket>, StoreError>;
}

#[async_trait]
pub trait IntentStore: Send + Sync {
    /// Inserts a new WAITING intent. Fails with `DuplicateActiveIntent` when
    /// the buyer already has a live intent for the event.
    async fn insert(&self, new: NewIntent) -> Result<PurchaseIntent, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PurchaseIntent>, StoreError>;

    /// The live (WAITING or PROCESSING) intent for a buyer on an event, if any.
    async fn find_existing_active(
        &self,
        session_id: &str,
        event_id: Uuid,
    ) -> Result<Option<PurchaseIntent>, StoreError>;

    /// Atomic WAITING -> PROCESSING transition. Returns false when the intent
    /// was not in WAITING (already claimed, cancelled, or expired).
    async fn claim(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Unconditional status write, used by the processor on intents it has
    /// claimed. Bumps `updated_at`.
    async fn set_status(&self, id: Uuid, status: IntentStatus) -> Result<(), StoreError>;

    /// Conditional WAITING -> EXPIRED transition, used by cancellation.
    /// Returns false when the intent already left WAITING.
    async fn expire_waiting(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Up to `limit` WAITING intents for the event in arrival order, ties
    /// broken by id.
    async fn next_waiting_for_event(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PurchaseIntent>, StoreError>;

    /// Events that currently have at least one WAITING intent.
    async fn events_with_waiting(&self) -> Result<Vec<Uuid>, StoreError>;

    /// Live intents for the same event that arrived before the given
    /// (arrival, id) pair.
    async fn count_ahead(&self, event_id: Uuid, arrival: i64, id: Uuid)
        -> Result<i64, StoreError>;

    /// Bulk WAITING -> EXPIRED for intents whose arrival ordinal is older
    /// than the cutoff. Returns the number of expired intents.
    async fn expire_older_than(&self, arrival_cutoff: i64) -> Result<u64, StoreError>;

    /// Crash recovery: PROCESSING -> FAILED for intents not touched since
    /// `updated_before`. Returns the number of failed intents.
    async fn fail_stalled(&self, updated_before: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn stats_by_event(&self, event_id: Uuid) -> Result<QueueStats, StoreError>;
}
