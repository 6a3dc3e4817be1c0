use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::models::{SaveTimersRequest, Timer};
use crate::state::AppState;

pub async fn list_timers(state: &AppState, user_id: Uuid) -> Result<Vec<Timer>, AppError> {
    state.timers.list_timers(user_id).await
}

/// Replaces the caller's whole timer inventory.
pub async fn save_timers(
    state: &AppState,
    user_id: Uuid,
    request: SaveTimersRequest,
) -> Result<Vec<Timer>, AppError> {
    request.validate()?;
    if request.has_duplicate_ids() {
        return Err(AppError::BadRequest("Timer ids must be unique".into()));
    }
    state.timers.replace_timers(user_id, &request.timers).await
}
