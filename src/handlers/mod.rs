//! One async function per command or query. Handlers take the application
//! state and validated input and know nothing about HTTP.

pub mod auth;
pub mod routines;
pub mod timers;
pub mod users;

use serde::{Deserialize, Serialize};

use crate::auth::generate_access_token;
use crate::error::AppError;
use crate::models::User;
use crate::state::AppState;

/// Body of every plain command response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Signs a fresh access token for `user`.
pub fn access_token_for(state: &AppState, user: &User) -> Result<String, AppError> {
    generate_access_token(user, &state.auth.jwt_secret, state.auth.access_lifetime)
}

/// Loads the caller's account; a token for a deleted account is no longer
/// authorized.
pub async fn current_user(state: &AppState, id: uuid::Uuid) -> Result<User, AppError> {
    state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))
}
