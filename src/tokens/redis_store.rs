//! Redis-backed token store.
//!
//! Expiry events come from keyspace notifications on
//! `__keyevent@{db}__:expired`, which require `notify-keyspace-events` to
//! contain `Ex` on the server.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use super::{TokenKey, TokenStore, TOKEN_SENTINEL};
use crate::error::AppError;

pub struct RedisTokenStore {
    client: Client,
    conn: ConnectionManager,
    db: u8,
}

impl RedisTokenStore {
    pub async fn connect(url: &str, db: u8) -> Result<Self, AppError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn, db })
    }

    /// Shared connection, for other Redis-backed components.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }

    pub fn expired_channel(&self) -> String {
        format!("__keyevent@{}__:expired", self.db)
    }

    /// Turns on expired-key notifications. Managed Redis offerings often
    /// reject `CONFIG`, so this is opt-in.
    pub async fn enable_expiry_notifications(&self) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::cmd("CONFIG")
            .arg("SET")
            .arg("notify-keyspace-events")
            .arg("Ex")
            .query_async::<()>(&mut conn)
            .await?;
        log::info!("enabled redis keyspace notifications for expired keys");
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// Turns a `PTTL` reply into an absolute deadline. `-2` (no such key) and
/// `-1` (no expiry) have none.
fn deadline_from_ttl(now: DateTime<Utc>, ttl_ms: i64) -> Option<DateTime<Utc>> {
    if ttl_ms < 0 {
        return None;
    }
    now.checked_add_signed(Duration::milliseconds(ttl_ms))
}

/// Milliseconds left until `expires_at`. `SET … PX` rejects zero, so a
/// deadline already reached gets the shortest TTL and expires at once.
fn ttl_until(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> i64 {
    (expires_at - now).num_milliseconds().max(1)
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn set_until(&self, key: &TokenKey, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key.to_string())
            .arg(TOKEN_SENTINEL)
            .arg("PX")
            .arg(ttl_until(Utc::now(), expires_at))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &TokenKey) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key.to_string()).await?;
        Ok(exists)
    }

    async fn delete(&self, key: &TokenKey) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key.to_string()).await?;
        Ok(removed > 0)
    }

    async fn rename(&self, from: &TokenKey, to: &TokenKey) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();

        // Plain RENAME errors on a missing source key.
        let script = Script::new(
            r"
            if redis.call('EXISTS', KEYS[1]) == 1 then
                redis.call('RENAME', KEYS[1], KEYS[2])
                return 1
            else
                return 0
            end
            ",
        );

        let renamed: i64 = script
            .key(from.to_string())
            .key(to.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(renamed == 1)
    }

    async fn expire_at(&self, key: &TokenKey, expires_at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut conn = self.conn.clone();
        let updated: i64 = redis::cmd("PEXPIREAT")
            .arg(key.to_string())
            .arg(expires_at.timestamp_millis())
            .query_async(&mut conn)
            .await?;
        Ok(updated == 1)
    }

    async fn expires_at(&self, key: &TokenKey) -> Result<Option<DateTime<Utc>>, AppError> {
        let mut conn = self.conn.clone();
        let ttl: i64 = redis::cmd("PTTL")
            .arg(key.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(deadline_from_ttl(Utc::now(), ttl))
    }

    async fn subscribe_expired(&self) -> Result<BoxStream<'static, String>, AppError> {
        let channel = self.expired_channel();
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;
        log::info!("subscribed to {}", channel);

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(key) => Some(key),
                Err(e) => {
                    log::error!("unreadable expiry notification payload: {}", e);
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::TokenKind;

    #[test]
    fn test_ttl_reply_to_deadline() {
        let now = Utc::now();
        assert_eq!(
            deadline_from_ttl(now, 1_500),
            Some(now + Duration::milliseconds(1_500))
        );
        assert_eq!(deadline_from_ttl(now, 0), Some(now));
        assert_eq!(deadline_from_ttl(now, -1), None);
        assert_eq!(deadline_from_ttl(now, -2), None);
    }

    #[test]
    fn test_ttl_until_deadline() {
        let now = Utc::now();
        assert_eq!(ttl_until(now, now + Duration::seconds(90)), 90_000);
        assert_eq!(ttl_until(now, now), 1);
        assert_eq!(ttl_until(now, now - Duration::minutes(1)), 1);
    }

    #[tokio::test]
    #[ignore] // needs a Redis instance
    async fn test_set_rename_expire_round() {
        let store = RedisTokenStore::connect("redis://127.0.0.1:6379", 0)
            .await
            .unwrap();
        let old = TokenKey::new(TokenKind::Signup, crate::tokens::generate_token());
        let new = TokenKey::new(TokenKind::Signup, crate::tokens::generate_token());
        let deadline = Utc::now() + Duration::minutes(1);

        store.set_until(&old, deadline).await.unwrap();
        assert!(store.exists(&old).await.unwrap());
        assert!(store.rename(&old, &new).await.unwrap());
        assert!(!store.rename(&old, &new).await.unwrap());

        // PTTL is relative, so the read-back deadline is only close.
        let stored = store.expires_at(&new).await.unwrap().unwrap();
        let drift = (stored - deadline).num_milliseconds().abs();
        assert!(drift < 1_000, "deadline drifted by {}ms", drift);
        assert!(store.delete(&new).await.unwrap());
    }
}
