//! Refresh-token sessions, stored as `sess:{token}` → user id.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::error::AppError;
use crate::tokens::generate_token;

const SESSION_PREFIX: &str = "sess";

fn session_key(token: &str) -> String {
    format!("{}:{}", SESSION_PREFIX, token)
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Opens a session for `user_id` and returns its refresh token.
    async fn create(&self, user_id: Uuid, lifetime: Duration) -> Result<String, AppError>;

    async fn resolve(&self, token: &str) -> Result<Option<Uuid>, AppError>;

    async fn revoke(&self, token: &str) -> Result<bool, AppError>;
}

pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn create(&self, user_id: Uuid, lifetime: Duration) -> Result<String, AppError> {
        let token = generate_token();
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(session_key(&token))
            .arg(user_id.to_string())
            .arg("EX")
            .arg(lifetime.num_seconds().max(1))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(token)
    }

    async fn resolve(&self, token: &str) -> Result<Option<Uuid>, AppError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(session_key(token)).await?;
        Ok(value.and_then(|v| Uuid::parse_str(&v).ok()))
    }

    async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(session_key(token)).await?;
        Ok(removed > 0)
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, user_id: Uuid, lifetime: Duration) -> Result<String, AppError> {
        let token = generate_token();
        self.sessions
            .lock()
            .insert(session_key(&token), (user_id, Utc::now() + lifetime));
        Ok(token)
    }

    async fn resolve(&self, token: &str) -> Result<Option<Uuid>, AppError> {
        let key = session_key(token);
        let mut sessions = self.sessions.lock();
        let current = sessions.get(&key).copied();
        match current {
            Some((_, expires_at)) if expires_at <= Utc::now() => {
                sessions.remove(&key);
                Ok(None)
            }
            other => Ok(other.map(|(user_id, _)| user_id)),
        }
    }

    async fn revoke(&self, token: &str) -> Result<bool, AppError> {
        Ok(self.sessions.lock().remove(&session_key(token)).is_some())
    }
}
