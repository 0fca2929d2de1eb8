use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::store::IntentStore;
use crate::utils::error::AppError;

/// Caller-initiated withdrawal from the queue. Cancellation is scoped to the
/// submitting session and only reaches intents that are still WAITING; a
/// claimed intent runs to its own outcome, and completed purchases are never
/// revoked here.
pub struct Cancellation {
    intents: Arc<dyn IntentStore>,
}

impl Cancellation {
    pub fn new(intents: Arc<dyn IntentStore>) -> Self {
        Self { intents }
    }

    pub async fn cancel(&self, intent_id: Uuid, session_id: &str) -> Result<(), AppError> {
        let intent = self
            .intents
            .find_by_id(intent_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Intent {intent_id} does not exist")))?;

        if intent.session_id != session_id {
            return Err(AppError::Forbidden(
                "Intent belongs to a different session".to_string(),
            ));
        }

        if intent.status.is_terminal() {
            return Err(AppError::NotCancellable(intent.status.to_string()));
        }

        // Conditional WAITING -> EXPIRED. Zero rows means the processor
        // claimed it in the meantime.
        if self.intents.expire_waiting(intent_id).await? {
            info!(intent_id = %intent_id, "intent cancelled");
            Ok(())
        } else {
            let current = self
                .intents
                .find_by_id(intent_id)
                .await?
                .map(|i| i.status.to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string());
            Err(AppError::NotCancellable(current))
        }
    }
}
