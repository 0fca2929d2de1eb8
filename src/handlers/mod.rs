use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::NewEvent;
use crate::routes::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, empty_success, success};

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "boxoffice-api",
    };

    success(payload, "Health check successful").into_response()
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, AppError> {
    raw.parse()
        .map_err(|_| AppError::InvalidRequest(format!("'{raw}' is not a valid {what} id")))
}

// --- event admin ---

#[derive(Deserialize)]
pub struct CreateEventRequest {
    pub name: String,
    pub starts_at: chrono::DateTime<chrono::Utc>,
    pub total_tickets: i32,
}

pub async fn create_event(
    State(state): State<AppState>,
    Json(body): Json<CreateEventRequest>,
) -> Result<Response, AppError> {
    if body.name.is_empty() || body.name.len() > 255 {
        return Err(AppError::InvalidRequest(
            "name must be between 1 and 255 characters".to_string(),
        ));
    }
    if body.total_tickets < 0 {
        return Err(AppError::InvalidRequest(
            "total_tickets must not be negative".to_string(),
        ));
    }

    let event = state
        .events
        .create(NewEvent {
            name: body.name,
            starts_at: body.starts_at,
            total_tickets: body.total_tickets,
        })
        .await?;

    Ok(created(event, "Event created").into_response())
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events = state.events.list().await?;
    Ok(success(events, "Events retrieved").into_response())
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Response, AppError> {
    let event_id = parse_id(&event_id, "event")?;
    let event = state
        .events
        .get(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {event_id} does not exist")))?;
    Ok(success(event, "Event retrieved").into_response())
}

// --- fair queue ---

#[derive(Deserialize)]
pub struct SubmitIntentRequest {
    pub session_id: String,
    pub quantity: i32,
}

pub async fn submit_intent(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    Json(body): Json<SubmitIntentRequest>,
) -> Result<Response, AppError> {
    let event_id = parse_id(&event_id, "event")?;
    let handle = state
        .intake
        .submit(event_id, &body.session_id, body.quantity)
        .await?;
    Ok(success(handle, "Purchase intent queued").into_response())
}

#[derive(Deserialize)]
pub struct CancelIntentRequest {
    pub session_id: String,
}

pub async fn cancel_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
    Json(body): Json<CancelIntentRequest>,
) -> Result<Response, AppError> {
    let intent_id = parse_id(&intent_id, "intent")?;
    state.cancellation.cancel(intent_id, &body.session_id).await?;
    Ok(empty_success("Purchase intent cancelled").into_response())
}

pub async fn intent_status(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
) -> Result<Response, AppError> {
    let intent_id = parse_id(&intent_id, "intent")?;
    let view = state.query.status(intent_id).await?;
    Ok(success(view, "Intent status retrieved").into_response())
}

pub async fn intent_completion(
    State(state): State<AppState>,
    Path(intent_id): Path<String>,
) -> Result<Response, AppError> {
    let intent_id = parse_id(&intent_id, "intent")?;
    let view = state.query.completion(intent_id).await?;
    Ok(success(view, "Intent completion retrieved").into_response())
}

pub async fn event_queue_stats(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Response, AppError> {
    let event_id = parse_id(&event_id, "event")?;
    let stats = state.query.stats(event_id).await?;
    Ok(success(stats, "Queue stats retrieved").into_response())
}

pub async fn queue_health(State(state): State<AppState>) -> Response {
    success(state.processor_health.snapshot(), "Processor health retrieved").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_id_accepts_uuids_and_rejects_garbage() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "event").unwrap(), id);

        let err = parse_id("not-a-uuid", "event").unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
