use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::clock::ArrivalClock;
use crate::config::QueueConfig;
use crate::models::{IntentStatus, NewIntent, PurchaseIntent};
use crate::store::{EventStore, IntentStore, StoreError};
use crate::utils::error::AppError;

pub const MAX_QUANTITY: i32 = 10;
pub const MAX_SESSION_ID_LEN: usize = 255;

/// What a buyer gets back after submitting: the intent's identity and where
/// it currently sits in the queue.
#[derive(Debug, Clone, Serialize)]
pub struct IntentHandle {
    pub intent_id: Uuid,
    pub queue_position: i64,
    pub estimated_wait_seconds: u64,
    pub status: IntentStatus,
}

/// Admits purchase requests into the fair queue.
///
/// Create-or-retrieve per (session, event): while a buyer has a live intent
/// for an event, resubmitting returns the same handle instead of a new row.
pub struct Intake {
    events: Arc<dyn EventStore>,
    intents: Arc<dyn IntentStore>,
    clock: Arc<ArrivalClock>,
    config: QueueConfig,
}

impl Intake {
    pub fn new(
        events: Arc<dyn EventStore>,
        intents: Arc<dyn IntentStore>,
        clock: Arc<ArrivalClock>,
        config: QueueConfig,
    ) -> Self {
        Self {
            events,
            intents,
            clock,
            config,
        }
    }

    pub async fn submit(
        &self,
        event_id: Uuid,
        session_id: &str,
        quantity: i32,
    ) -> Result<IntentHandle, AppError> {
        if !(1..=MAX_QUANTITY).contains(&quantity) {
            return Err(AppError::InvalidRequest(format!(
                "quantity must be between 1 and {MAX_QUANTITY}"
            )));
        }
        if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
            return Err(AppError::InvalidRequest(format!(
                "session_id must be between 1 and {MAX_SESSION_ID_LEN} characters"
            )));
        }

        let event = self
            .events
            .get(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {event_id} does not exist")))?;

        // Best-effort fast path; the allocator re-checks under the row lock.
        if event.has_started(Utc::now()) {
            return Err(AppError::Unavailable(
                "Event has already started".to_string(),
            ));
        }
        if event.available_tickets == 0 {
            return Err(AppError::Unavailable("Event is sold out".to_string()));
        }

        if let Some(existing) = self
            .intents
            .find_existing_active(session_id, event_id)
            .await?
        {
            return self.handle_for(&existing).await;
        }

        let new = NewIntent {
            event_id,
            session_id: session_id.to_string(),
            quantity,
            arrival: self.clock.next(),
        };

        match self.intents.insert(new).await {
            Ok(intent) => {
                info!(
                    intent_id = %intent.id,
                    event_id = %event_id,
                    quantity,
                    arrival = intent.arrival,
                    "intent queued"
                );
                self.handle_for(&intent).await
            }
            // Lost a race against a concurrent submission from the same
            // session; the winner's row is the one to return.
            Err(StoreError::DuplicateActiveIntent) => {
                let existing = self
                    .intents
                    .find_existing_active(session_id, event_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal("active intent vanished during intake".to_string())
                    })?;
                self.handle_for(&existing).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_for(&self, intent: &PurchaseIntent) -> Result<IntentHandle, AppError> {
        let ahead = self
            .intents
            .count_ahead(intent.event_id, intent.arrival, intent.id)
            .await?;
        let position = ahead + 1;

        Ok(IntentHandle {
            intent_id: intent.id,
            queue_position: position,
            estimated_wait_seconds: (position - 1).max(0) as u64
                * self.config.wait_estimate_per_intent.as_secs(),
            status: intent.status,
        })
    }
}
