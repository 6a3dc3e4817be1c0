//!
//! # Error Handling
//!
//! This module defines `AppError`, the single error type returned by handlers,
//! the token service and every store implementation.
//!
//! `AppError` implements `actix_web::error::ResponseError`, so a handler can
//! return `Result<impl Responder, AppError>` and the variant decides the HTTP
//! status. Store failures are logged with their full detail but reach the
//! client only as a generic message.
//!
//! `From` implementations cover `sqlx::Error`, `redis::RedisError`,
//! `validator::ValidationErrors`, `jsonwebtoken::errors::Error` and
//! `bcrypt::BcryptError`, allowing plain `?` propagation.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;
use validator::ValidationErrors;

/// Message shown to clients for a token that matches no account.
pub const INVALID_TOKEN_MESSAGE: &str = "The provided token is invalid.";
/// Message shown to clients when a matched token could not be consumed.
pub const VERIFICATION_CONFLICT_MESSAGE: &str =
    "The token could not be verified. Please request a new one.";

/// Every error the service can report.
#[derive(Debug, Error)]
pub enum AppError {
    /// The presented token does not match any user column.
    #[error("invalid token")]
    InvalidToken,
    /// The token matched a user but the conditional update affected no rows
    /// (concurrent verification or already consumed).
    #[error("verification conflict")]
    VerificationConflict,
    /// Email or username already belongs to another account.
    #[error("duplicate identity: {0}")]
    DuplicateIdentity(String),
    /// The relational store or the token store failed.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// The notification adapter could not deliver a message.
    #[error("notification failure: {0}")]
    NotificationFailure(String),
    /// Authentication failed or is required but missing (HTTP 401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Malformed or semantically invalid request (HTTP 400).
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The requested resource was not found (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),
    /// Unexpected server-side failure not covered above (HTTP 500).
    #[error("internal server error: {0}")]
    InternalServerError(String),
    /// Input validation failed (HTTP 422).
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl AppError {
    fn client_message(&self) -> String {
        match self {
            AppError::InvalidToken => INVALID_TOKEN_MESSAGE.to_string(),
            AppError::VerificationConflict => VERIFICATION_CONFLICT_MESSAGE.to_string(),
            AppError::DuplicateIdentity(field) => format!("Duplicate {}", field),
            // Store details stay in the logs.
            AppError::StoreUnavailable(_) => "Internal server error".to_string(),
            AppError::NotificationFailure(_) => "Cannot deliver notification".to_string(),
            AppError::Unauthorized(msg)
            | AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::InternalServerError(msg)
            | AppError::ValidationError(msg) => msg.clone(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidToken => StatusCode::BAD_REQUEST,
            AppError::VerificationConflict => StatusCode::CONFLICT,
            AppError::DuplicateIdentity(_) => StatusCode::BAD_REQUEST,
            AppError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotificationFailure(_) => StatusCode::BAD_GATEWAY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::StoreUnavailable(detail) = self {
            log::error!("store failure: {}", detail);
        }
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.client_message()
        }))
    }
}

/// Converts `sqlx::Error` into `AppError`.
///
/// `RowNotFound` becomes `NotFound`, a unique-constraint violation becomes
/// `DuplicateIdentity` naming the violated constraint, everything else is
/// `StoreUnavailable`.
impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> AppError {
        match error {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".into()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                let field = match db.constraint() {
                    Some(c) if c.contains("email") => "email",
                    Some(c) if c.contains("username") => "username",
                    _ => "value",
                };
                AppError::DuplicateIdentity(field.to_string())
            }
            other => AppError::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for AppError {
    fn from(error: redis::RedisError) -> AppError {
        AppError::StoreUnavailable(format!("redis: {}", error))
    }
}

/// Converts `validator::ValidationErrors` into `AppError::ValidationError`.
///
/// The detailed validation messages are preserved.
impl From<ValidationErrors> for AppError {
    fn from(error: ValidationErrors) -> AppError {
        AppError::ValidationError(error.to_string())
    }
}

/// Converts `jsonwebtoken::errors::Error` into `AppError::Unauthorized`.
impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(error: jsonwebtoken::errors::Error) -> AppError {
        AppError::Unauthorized(error.to_string())
    }
}

/// Converts `bcrypt::BcryptError` into `AppError::InternalServerError`.
impl From<bcrypt::BcryptError> for AppError {
    fn from(error: bcrypt::BcryptError) -> AppError {
        AppError::InternalServerError(error.to_string())
    }
}
