//! Verification tokens.
//!
//! A pending token lives in two places: a nullable column on the user row
//! (authoritative) and an expiring `{event}:{token}` key in the token store
//! (a time-bounded shadow whose expiry drives [`ExpiryListener`]).

pub mod listener;
pub mod memory;
pub mod redis_store;
pub mod service;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub use listener::{ExpiryListener, Reconciliation};
pub use memory::MemoryTokenStore;
pub use redis_store::RedisTokenStore;
pub use service::{Consumption, TokenService, Transition};

/// Value stored under every token key. Only the key's presence matters.
pub const TOKEN_SENTINEL: &str = "1";

/// The workflow a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    #[serde(rename = "signupToken")]
    Signup,
    #[serde(rename = "resetPasswordToken")]
    ResetPassword,
    #[serde(rename = "changeEmailToken")]
    ChangeEmail,
}

impl TokenKind {
    pub const ALL: [TokenKind; 3] = [
        TokenKind::Signup,
        TokenKind::ResetPassword,
        TokenKind::ChangeEmail,
    ];

    /// Event name used as the token-store key prefix.
    pub fn event(self) -> &'static str {
        match self {
            TokenKind::Signup => "signupToken",
            TokenKind::ResetPassword => "resetPasswordToken",
            TokenKind::ChangeEmail => "changeEmailToken",
        }
    }

    /// Column of the `users` table holding the pending token.
    pub fn column(self) -> &'static str {
        match self {
            TokenKind::Signup => "signup_token",
            TokenKind::ResetPassword => "reset_password_token",
            TokenKind::ChangeEmail => "change_email_token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.event())
    }
}

impl FromStr for TokenKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TokenKind::ALL
            .into_iter()
            .find(|kind| kind.event() == s)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown token event: {}", s)))
    }
}

/// A `{event}:{token}` key in the token store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub kind: TokenKind,
    pub token: String,
}

impl TokenKey {
    pub fn new(kind: TokenKind, token: impl Into<String>) -> Self {
        Self {
            kind,
            token: token.into(),
        }
    }

    /// Parses a raw store key. Keys of other namespaces yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (event, token) = raw.split_once(':')?;
        let kind = event.parse::<TokenKind>().ok()?;
        if token.is_empty() {
            return None;
        }
        Some(Self::new(kind, token))
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.event(), self.token)
    }
}

/// Generates a fresh, globally unique token value.
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Expiring key-value store shadowing the pending-token columns.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Writes the key with an absolute expiry, replacing any previous value.
    async fn set_until(&self, key: &TokenKey, expires_at: DateTime<Utc>) -> Result<(), AppError>;

    async fn exists(&self, key: &TokenKey) -> Result<bool, AppError>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &TokenKey) -> Result<bool, AppError>;

    /// Moves `from` to `to`, keeping its expiry. Returns `false` when `from`
    /// does not exist.
    async fn rename(&self, from: &TokenKey, to: &TokenKey) -> Result<bool, AppError>;

    /// Sets a new absolute expiry on an existing key. Returns `false` when
    /// the key does not exist.
    async fn expire_at(&self, key: &TokenKey, expires_at: DateTime<Utc>) -> Result<bool, AppError>;

    /// Absolute expiry of the key, `None` when it does not exist or has no
    /// expiry.
    async fn expires_at(&self, key: &TokenKey) -> Result<Option<DateTime<Utc>>, AppError>;

    /// Stream of raw names of keys that expired. Keys of every namespace are
    /// delivered; filtering is up to the consumer.
    async fn subscribe_expired(&self) -> Result<BoxStream<'static, String>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format_round_trips_through_parse() {
        let key = TokenKey::new(TokenKind::ChangeEmail, "abc123");
        assert_eq!(key.to_string(), "changeEmailToken:abc123");
        assert_eq!(TokenKey::parse("changeEmailToken:abc123"), Some(key));
    }

    #[test]
    fn test_parse_ignores_foreign_keys() {
        assert_eq!(TokenKey::parse("sess:abc"), None);
        assert_eq!(TokenKey::parse("signupToken:"), None);
        assert_eq!(TokenKey::parse("no-separator"), None);
    }

    #[test]
    fn test_kind_from_event_name() {
        assert_eq!("resetPasswordToken".parse::<TokenKind>().unwrap(), TokenKind::ResetPassword);
        assert!("refreshToken".parse::<TokenKind>().is_err());
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        assert_ne!(generate_token(), generate_token());
        assert_eq!(generate_token().len(), 32);
    }
}
