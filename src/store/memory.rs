//! In-memory store used by unit tests in place of Postgres. Implements the
//! same narrow interfaces so intake, cancellation, queries, and the queue
//! processor can be exercised without a database.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::allocator::{AllocationOutcome, Allocator};
use crate::models::{Event, IntentStatus, NewEvent, NewIntent, PurchaseIntent, Ticket};
use crate::store::{EventStore, IntentStore, QueueStats, StoreError, TicketStore};

#[derive(Default)]
struct State {
    events: HashMap<Uuid, Event>,
    intents: HashMap<Uuid, PurchaseIntent>,
    tickets: Vec<Ticket>,
    /// Outcomes to return from `allocate` before touching inventory, in
    /// order. Lets tests script CONFLICT races and transient failures.
    forced_outcomes: VecDeque<AllocationOutcome>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_event(&self, name: &str, starts_at: DateTime<Utc>, total: i32) -> Event {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            name: name.to_string(),
            starts_at,
            total_tickets: total,
            available_tickets: total,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .unwrap()
            .events
            .insert(event.id, event.clone());
        event
    }

    pub fn force_outcome(&self, outcome: AllocationOutcome) {
        self.state.lock().unwrap().forced_outcomes.push_back(outcome);
    }

    pub fn event(&self, id: Uuid) -> Event {
        self.state.lock().unwrap().events[&id].clone()
    }

    pub fn intent(&self, id: Uuid) -> PurchaseIntent {
        self.state.lock().unwrap().intents[&id].clone()
    }

    pub fn ticket_count(&self, event_id: Uuid) -> usize {
        self.state
            .lock()
            .unwrap()
            .tickets
            .iter()
            .filter(|t| t.event_id == event_id)
            .count()
    }

    /// Backdates an intent's arrival and `updated_at`, for expiry and
    /// recovery tests.
    pub fn age_intent(&self, id: Uuid, age: chrono::Duration) {
        let mut state = self.state.lock().unwrap();
        if let Some(intent) = state.intents.get_mut(&id) {
            intent.arrival -= age.num_microseconds().unwrap_or(i64::MAX);
            intent.updated_at = intent.updated_at - age;
        }
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create(&self, new: NewEvent) -> Result<Event, StoreError> {
        Ok(self.add_event(&new.name, new.starts_at, new.total_tickets))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        Ok(self.state.lock().unwrap().events.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Event>, StoreError> {
        let mut events: Vec<Event> = self.state.lock().unwrap().events.values().cloned().collect();
        events.sort_by_key(|e| e.starts_at);
        Ok(events)
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn find_by_purchase(&self, purchase_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tickets
            .iter()
            .filter(|t| t.purchase_id == purchase_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl IntentStore for MemoryStore {
    async fn insert(&self, new: NewIntent) -> Result<PurchaseIntent, StoreError> {
        let mut state = self.state.lock().unwrap();
        let duplicate = state.intents.values().any(|i| {
            i.session_id == new.session_id
                && i.event_id == new.event_id
                && !i.status.is_terminal()
        });
        if duplicate {
            return Err(StoreError::DuplicateActiveIntent);
        }

        let now = Utc::now();
        let intent = PurchaseIntent {
            id: Uuid::new_v4(),
            event_id: new.event_id,
            session_id: new.session_id,
            quantity: new.quantity,
            arrival: new.arrival,
            status: IntentStatus::Waiting,
            created_at: now,
            updated_at: now,
        };
        state.intents.insert(intent.id, intent.clone());
        Ok(intent)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PurchaseIntent>, StoreError> {
        Ok(self.state.lock().unwrap().intents.get(&id).cloned())
    }

    async fn find_existing_active(
        &self,
        session_id: &str,
        event_id: Uuid,
    ) -> Result<Option<PurchaseIntent>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .intents
            .values()
            .find(|i| {
                i.session_id == session_id && i.event_id == event_id && !i.status.is_terminal()
            })
            .cloned())
    }

    async fn claim(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.intents.get_mut(&id) {
            Some(intent) if intent.status == IntentStatus::Waiting => {
                intent.status = IntentStatus::Processing;
                intent.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_status(&self, id: Uuid, status: IntentStatus) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(intent) = state.intents.get_mut(&id) {
            intent.status = status;
            intent.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn expire_waiting(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.intents.get_mut(&id) {
            Some(intent) if intent.status == IntentStatus::Waiting => {
                intent.status = IntentStatus::Expired;
                intent.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn next_waiting_for_event(
        &self,
        event_id: Uuid,
        limit: i64,
    ) -> Result<Vec<PurchaseIntent>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut waiting: Vec<PurchaseIntent> = state
            .intents
            .values()
            .filter(|i| i.event_id == event_id && i.status == IntentStatus::Waiting)
            .cloned()
            .collect();
        waiting.sort_by_key(|i| (i.arrival, i.id));
        waiting.truncate(limit as usize);
        Ok(waiting)
    }

    async fn events_with_waiting(&self) -> Result<Vec<Uuid>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut ids: Vec<Uuid> = state
            .intents
            .values()
            .filter(|i| i.status == IntentStatus::Waiting)
            .map(|i| i.event_id)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn count_ahead(
        &self,
        event_id: Uuid,
        arrival: i64,
        id: Uuid,
    ) -> Result<i64, StoreError> {
        let state = self.state.lock().unwrap();
        let count = state
            .intents
            .values()
            .filter(|i| {
                i.event_id == event_id
                    && matches!(i.status, IntentStatus::Waiting | IntentStatus::Processing)
                    && (i.arrival < arrival || (i.arrival == arrival && i.id < id))
            })
            .count();
        Ok(count as i64)
    }

    async fn expire_older_than(&self, arrival_cutoff: i64) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut expired = 0;
        for intent in state.intents.values_mut() {
            if intent.status == IntentStatus::Waiting && intent.arrival < arrival_cutoff {
                intent.status = IntentStatus::Expired;
                intent.updated_at = Utc::now();
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn fail_stalled(&self, updated_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap();
        let mut failed = 0;
        for intent in state.intents.values_mut() {
            if intent.status == IntentStatus::Processing && intent.updated_at < updated_before {
                intent.status = IntentStatus::Failed;
                intent.updated_at = Utc::now();
                failed += 1;
            }
        }
        Ok(failed)
    }

    async fn stats_by_event(&self, event_id: Uuid) -> Result<QueueStats, StoreError> {
        let state = self.state.lock().unwrap();
        let mut stats = QueueStats::default();
        for intent in state.intents.values().filter(|i| i.event_id == event_id) {
            match intent.status {
                IntentStatus::Waiting => stats.waiting += 1,
                IntentStatus::Processing => stats.processing += 1,
                IntentStatus::Completed => stats.completed += 1,
                IntentStatus::Failed => stats.failed += 1,
                IntentStatus::Expired => stats.expired += 1,
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl Allocator for MemoryStore {
    async fn allocate(&self, intent: &PurchaseIntent) -> AllocationOutcome {
        let mut state = self.state.lock().unwrap();

        if let Some(outcome) = state.forced_outcomes.pop_front() {
            return outcome;
        }

        let Some(event) = state.events.get(&intent.event_id).cloned() else {
            return AllocationOutcome::Internal(format!(
                "event {} no longer exists",
                intent.event_id
            ));
        };

        if event.available_tickets < intent.quantity {
            return AllocationOutcome::Insufficient;
        }
        if event.has_started(Utc::now()) {
            return AllocationOutcome::EventPast;
        }

        let now = Utc::now();
        let mut tickets = Vec::with_capacity(intent.quantity as usize);
        for _ in 0..intent.quantity {
            tickets.push(Ticket {
                id: Uuid::new_v4(),
                event_id: event.id,
                purchase_id: intent.id,
                issued_at: now,
            });
        }
        state.tickets.extend(tickets.iter().cloned());

        let stored = state.events.get_mut(&event.id).expect("event vanished");
        stored.available_tickets -= intent.quantity;
        stored.version += 1;
        stored.updated_at = now;

        AllocationOutcome::Success { tickets }
    }
}
