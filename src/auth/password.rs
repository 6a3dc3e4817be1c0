use crate::error::AppError;

/// Hashes `password` with bcrypt at `cost` (4..=31).
pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Checks `password` against a stored bcrypt hash. A malformed stored hash is
/// an internal error, not a failed login.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    bcrypt::verify(password, password_hash)
        .map_err(|e| AppError::InternalServerError(format!("Cannot verify password: {}", e)))
}
