use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::models::{Routine, SaveRoutineRequest};
use crate::state::AppState;

pub async fn list_routines(state: &AppState, user_id: Uuid) -> Result<Vec<Routine>, AppError> {
    state.routines.list_routines(user_id).await
}

pub async fn save_routine(
    state: &AppState,
    user_id: Uuid,
    request: SaveRoutineRequest,
) -> Result<Routine, AppError> {
    request.validate()?;
    if request.data.is_empty() {
        return Err(AppError::BadRequest("A routine needs at least one timer".into()));
    }
    state.routines.save_routine(user_id, &request).await
}

pub async fn delete_routine(state: &AppState, user_id: Uuid, routine_id: &str) -> Result<(), AppError> {
    match state.routines.delete_routine(user_id, routine_id).await? {
        0 => Err(AppError::NotFound("Routine not found".into())),
        _ => Ok(()),
    }
}
