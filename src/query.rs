use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::models::{Event, IntentStatus, PurchaseIntent, Ticket};
use crate::store::{EventStore, IntentStore, TicketStore};
use crate::utils::error::AppError;

/// Read-only projections over the queue: position for live intents, outcome
/// for terminal ones, aggregate stats per event.
pub struct QueueQuery {
    events: Arc<dyn EventStore>,
    intents: Arc<dyn IntentStore>,
    tickets: Arc<dyn TicketStore>,
    config: QueueConfig,
}

#[derive(Debug, Serialize)]
pub struct EventSummary {
    pub id: Uuid,
    pub name: String,
    pub starts_at: chrono::DateTime<chrono::Utc>,
    pub total_tickets: i32,
    pub available_tickets: i32,
}

impl From<Event> for EventSummary {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            name: event.name,
            starts_at: event.starts_at,
            total_tickets: event.total_tickets,
            available_tickets: event.available_tickets,
        }
    }
}

/// Terminal outcome attached to a status view.
#[derive(Debug, Serialize)]
pub struct PurchaseResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IntentStatusView {
    pub status: IntentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_seconds: Option<u64>,
    pub event: EventSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_result: Option<PurchaseResult>,
}

#[derive(Debug, Serialize)]
pub struct CompletionView {
    pub status: IntentStatus,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tickets: Option<Vec<Ticket>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventQueueStats {
    pub waiting: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub expired: i64,
    pub total_active: i64,
    pub total_tickets: i32,
    pub available_tickets: i32,
}

fn failure_reason(status: IntentStatus) -> Option<String> {
    match status {
        IntentStatus::Failed => Some("Ticket allocation failed".to_string()),
        IntentStatus::Expired => Some("Intent expired before allocation".to_string()),
        _ => None,
    }
}

impl QueueQuery {
    pub fn new(
        events: Arc<dyn EventStore>,
        intents: Arc<dyn IntentStore>,
        tickets: Arc<dyn TicketStore>,
        config: QueueConfig,
    ) -> Self {
        Self {
            events,
            intents,
            tickets,
            config,
        }
    }

    pub async fn status(&self, intent_id: Uuid) -> Result<IntentStatusView, AppError> {
        let intent = self.find_intent(intent_id).await?;
        let event = self
            .events
            .get(intent.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {} does not exist", intent.event_id)))?;

        if intent.status.is_terminal() {
            let result = self.terminal_result(&intent).await?;
            return Ok(IntentStatusView {
                status: intent.status,
                queue_position: None,
                estimated_wait_seconds: None,
                event: event.into(),
                purchase_result: Some(result),
            });
        }

        let ahead = self
            .intents
            .count_ahead(intent.event_id, intent.arrival, intent.id)
            .await?;
        let position = ahead + 1;

        Ok(IntentStatusView {
            status: intent.status,
            queue_position: Some(position),
            estimated_wait_seconds: Some(
                (position - 1).max(0) as u64 * self.config.wait_estimate_per_intent.as_secs(),
            ),
            event: event.into(),
            purchase_result: None,
        })
    }

    pub async fn completion(&self, intent_id: Uuid) -> Result<CompletionView, AppError> {
        let intent = self.find_intent(intent_id).await?;

        if !intent.status.is_terminal() {
            return Ok(CompletionView {
                status: intent.status,
                success: false,
                purchase_id: None,
                tickets: None,
                processing_time_ms: None,
                message: Some("Intent has not finished processing".to_string()),
            });
        }

        let processing_time_ms = (intent.updated_at - intent.created_at).num_milliseconds();

        if intent.status == IntentStatus::Completed {
            let tickets = self.tickets.find_by_purchase(intent.id).await?;
            return Ok(CompletionView {
                status: intent.status,
                success: true,
                purchase_id: Some(intent.id),
                tickets: Some(tickets),
                processing_time_ms: Some(processing_time_ms),
                message: None,
            });
        }

        Ok(CompletionView {
            status: intent.status,
            success: false,
            purchase_id: None,
            tickets: None,
            processing_time_ms: Some(processing_time_ms),
            message: failure_reason(intent.status),
        })
    }

    pub async fn stats(&self, event_id: Uuid) -> Result<EventQueueStats, AppError> {
        let event = self
            .events
            .get(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event {event_id} does not exist")))?;

        let stats = self.intents.stats_by_event(event_id).await?;

        Ok(EventQueueStats {
            waiting: stats.waiting,
            processing: stats.processing,
            completed: stats.completed,
            failed: stats.failed,
            expired: stats.expired,
            total_active: stats.total_active(),
            total_tickets: event.total_tickets,
            available_tickets: event.available_tickets,
        })
    }

    async fn find_intent(&self, intent_id: Uuid) -> Result<PurchaseIntent, AppError> {
        self.intents
            .find_by_id(intent_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Intent {intent_id} does not exist")))
    }

    async fn terminal_result(&self, intent: &PurchaseIntent) -> Result<PurchaseResult, AppError> {
        if intent.status == IntentStatus::Completed {
            let tickets = self.tickets.find_by_purchase(intent.id).await?;
            Ok(PurchaseResult {
                purchase_id: Some(intent.id),
                ticket_count: Some(tickets.len()),
                reason: None,
            })
        } else {
            Ok(PurchaseResult {
                purchase_id: None,
                ticket_count: None,
                reason: failure_reason(intent.status),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::{AllocationOutcome, Allocator};
    use crate::models::NewIntent;
    use crate::store::memory::MemoryStore;
    use chrono::{Duration, Utc};

    fn query(store: &Arc<MemoryStore>) -> QueueQuery {
        QueueQuery::new(
            Arc::clone(store) as Arc<dyn EventStore>,
            Arc::clone(store) as Arc<dyn IntentStore>,
            Arc::clone(store) as Arc<dyn TicketStore>,
            QueueConfig::default(),
        )
    }

    async fn submit(store: &MemoryStore, event_id: Uuid, session: &str, arrival: i64) -> Uuid {
        store
            .insert(NewIntent {
                event_id,
                session_id: session.to_string(),
                quantity: 2,
                arrival,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn unknown_intent_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = query(&store).status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn position_counts_only_live_intents_ahead() {
        let store = Arc::new(MemoryStore::new());
        let event = store.add_event("Concert", Utc::now() + Duration::hours(1), 100);

        let first = submit(&store, event.id, "buyer-1", 10).await;
        let second = submit(&store, event.id, "buyer-2", 20).await;
        let third = submit(&store, event.id, "buyer-3", 30).await;

        let view = query(&store).status(third).await.unwrap();
        assert_eq!(view.queue_position, Some(3));
        assert_eq!(view.estimated_wait_seconds, Some(60));

        // A terminal intent ahead no longer occupies a position.
        store.set_status(first, IntentStatus::Expired).await.unwrap();
        let view = query(&store).status(third).await.unwrap();
        assert_eq!(view.queue_position, Some(2));

        // A PROCESSING intent ahead still does.
        assert!(store.claim(second).await.unwrap());
        let view = query(&store).status(third).await.unwrap();
        assert_eq!(view.queue_position, Some(2));
    }

    #[tokio::test]
    async fn equal_arrivals_break_ties_by_id() {
        let store = Arc::new(MemoryStore::new());
        let event = store.add_event("Concert", Utc::now() + Duration::hours(1), 100);

        let a = submit(&store, event.id, "buyer-1", 50).await;
        let b = submit(&store, event.id, "buyer-2", 50).await;

        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let view_lo = query(&store).status(lo).await.unwrap();
        let view_hi = query(&store).status(hi).await.unwrap();
        assert_eq!(view_lo.queue_position, Some(1));
        assert_eq!(view_hi.queue_position, Some(2));
    }

    #[tokio::test]
    async fn completed_status_reports_purchase_result() {
        let store = Arc::new(MemoryStore::new());
        let event = store.add_event("Concert", Utc::now() + Duration::hours(1), 100);
        let id = submit(&store, event.id, "buyer-1", 10).await;

        let intent = store.intent(id);
        assert!(matches!(
            store.allocate(&intent).await,
            AllocationOutcome::Success { .. }
        ));
        store.set_status(id, IntentStatus::Completed).await.unwrap();

        let view = query(&store).status(id).await.unwrap();
        assert_eq!(view.status, IntentStatus::Completed);
        assert!(view.queue_position.is_none());
        let result = view.purchase_result.unwrap();
        assert_eq!(result.purchase_id, Some(id));
        assert_eq!(result.ticket_count, Some(2));
    }

    #[tokio::test]
    async fn completion_signals_not_ready_until_terminal() {
        let store = Arc::new(MemoryStore::new());
        let event = store.add_event("Concert", Utc::now() + Duration::hours(1), 100);
        let id = submit(&store, event.id, "buyer-1", 10).await;

        let view = query(&store).completion(id).await.unwrap();
        assert!(!view.success);
        assert_eq!(view.status, IntentStatus::Waiting);
        assert!(view.tickets.is_none());
        assert!(view.message.is_some());
    }

    #[tokio::test]
    async fn completion_lists_tickets_for_completed_intent() {
        let store = Arc::new(MemoryStore::new());
        let event = store.add_event("Concert", Utc::now() + Duration::hours(1), 100);
        let id = submit(&store, event.id, "buyer-1", 10).await;

        let intent = store.intent(id);
        store.allocate(&intent).await;
        store.set_status(id, IntentStatus::Completed).await.unwrap();

        let view = query(&store).completion(id).await.unwrap();
        assert!(view.success);
        assert_eq!(view.purchase_id, Some(id));
        let tickets = view.tickets.unwrap();
        assert_eq!(tickets.len(), 2);
        assert!(tickets.iter().all(|t| t.purchase_id == id));
        assert!(view.processing_time_ms.is_some());
    }

    #[tokio::test]
    async fn failed_completion_carries_a_reason() {
        let store = Arc::new(MemoryStore::new());
        let event = store.add_event("Concert", Utc::now() + Duration::hours(1), 100);
        let id = submit(&store, event.id, "buyer-1", 10).await;
        store.set_status(id, IntentStatus::Failed).await.unwrap();

        let view = query(&store).completion(id).await.unwrap();
        assert!(!view.success);
        assert!(view.message.unwrap().contains("allocation failed"));
    }

    #[tokio::test]
    async fn stats_group_intents_by_status() {
        let store = Arc::new(MemoryStore::new());
        let event = store.add_event("Concert", Utc::now() + Duration::hours(1), 100);

        let a = submit(&store, event.id, "buyer-1", 10).await;
        let b = submit(&store, event.id, "buyer-2", 20).await;
        submit(&store, event.id, "buyer-3", 30).await;
        store.set_status(a, IntentStatus::Completed).await.unwrap();
        assert!(store.claim(b).await.unwrap());

        let stats = query(&store).stats(event.id).await.unwrap();
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.expired, 0);
        assert_eq!(stats.total_active, 2);
        assert_eq!(stats.total_tickets, 100);
    }
}
