use crate::error::AppError;
use crate::models::User;
use chrono::Duration;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents the claims encoded within an access token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// The user's id.
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    /// Expiration timestamp (seconds since epoch).
    pub exp: usize,
}

/// Signs an access token for `user` valid for `lifetime`.
///
/// # Returns
/// Returns `AppError::InternalServerError` if encoding fails.
pub fn generate_access_token(user: &User, secret: &str, lifetime: Duration) -> Result<String, AppError> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(lifetime)
        .ok_or_else(|| AppError::InternalServerError("Token lifetime out of range".into()))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        username: user.username.clone(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))
}

/// Verifies an access token and decodes its claims.
///
/// Returns `AppError::Unauthorized` if the token is malformed, its signature
/// is invalid, or it has expired.
pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}
