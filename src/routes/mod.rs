use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::cancel::Cancellation;
use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{
    cancel_intent, create_event, event_queue_stats, get_event, health_check, intent_completion,
    intent_status, list_events, queue_health, submit_intent,
};
use crate::intake::Intake;
use crate::query::QueueQuery;
use crate::queue::ProcessorHealth;
use crate::store::EventStore;

/// Everything the handlers need, assembled once at boot.
#[derive(Clone)]
pub struct AppState {
    pub events: Arc<dyn EventStore>,
    pub intake: Arc<Intake>,
    pub cancellation: Arc<Cancellation>,
    pub query: Arc<QueueQuery>,
    pub processor_health: Arc<ProcessorHealth>,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", post(create_event).get(list_events))
        .route("/events/:event_id", get(get_event))
        .route("/events/:event_id/intents", post(submit_intent))
        .route("/events/:event_id/queue", get(event_queue_stats))
        .route(
            "/intents/:intent_id",
            get(intent_status).delete(cancel_intent),
        )
        .route("/intents/:intent_id/completion", get(intent_completion))
        .route("/queue/health", get(queue_health))
        .layer(create_security_headers_layer())
        .layer(create_cors_layer())
        .with_state(state)
}
