use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row of the `users` table.
///
/// `password_hash` and the pending-token columns never leave the service;
/// use [`UserProfile`] for anything that is serialized to a client.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub signup_token: Option<String>,
    pub reset_password_token: Option<String>,
    pub change_email_token: Option<String>,
    pub new_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// An account is verified once its signup token has been consumed.
    pub fn is_verified(&self) -> bool {
        self.signup_token.is_none()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            is_verified: self.is_verified(),
        }
    }
}

/// Everything needed to insert a freshly registered account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub signup_token: String,
}

/// Client-facing view of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub is_verified: bool,
}
