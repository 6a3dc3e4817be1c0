//! In-process token store used by the `memory` storage backend and by tests.
//!
//! Expiry mirrors Redis: a key is gone once its deadline passes, and its name
//! is published to expiry subscribers either lazily (on the next access) or
//! by [`MemoryTokenStore::purge_expired`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::{TokenKey, TokenStore};
use crate::error::AppError;

const EXPIRY_CHANNEL_CAPACITY: usize = 1024;

pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    expired: broadcast::Sender<String>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        let (expired, _) = broadcast::channel(EXPIRY_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            expired,
        }
    }

    fn publish(&self, keys: Vec<String>) {
        for key in keys {
            // No subscriber is not an error.
            let _ = self.expired.send(key);
        }
    }

    /// Drops `raw` if its deadline has passed. Returns the live deadline.
    fn live_deadline(&self, raw: &str) -> Option<DateTime<Utc>> {
        let mut entries = self.entries.lock();
        let current = entries.get(raw).copied();
        match current {
            Some(deadline) if deadline <= Utc::now() => {
                entries.remove(raw);
                drop(entries);
                self.publish(vec![raw.to_string()]);
                None
            }
            other => other,
        }
    }

    /// Removes every key whose deadline has passed and publishes their names.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = {
            let mut entries = self.entries.lock();
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, deadline)| **deadline <= now)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                entries.remove(key);
            }
            expired
        };
        let count = expired.len();
        self.publish(expired);
        count
    }

    /// Expires `key` immediately, as if its deadline had just passed.
    pub fn expire_now(&self, key: &TokenKey) -> bool {
        let raw = key.to_string();
        let removed = self.entries.lock().remove(&raw).is_some();
        if removed {
            self.publish(vec![raw]);
        }
        removed
    }

    pub fn contains(&self, key: &TokenKey) -> bool {
        self.live_deadline(&key.to_string()).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs [`purge_expired`](Self::purge_expired) on a fixed interval.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired();
                if purged > 0 {
                    log::debug!("memory token store purged {} expired keys", purged);
                }
            }
        })
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn set_until(&self, key: &TokenKey, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        self.entries.lock().insert(key.to_string(), expires_at);
        if expires_at <= Utc::now() {
            self.live_deadline(&key.to_string());
        }
        Ok(())
    }

    async fn exists(&self, key: &TokenKey) -> Result<bool, AppError> {
        Ok(self.contains(key))
    }

    async fn delete(&self, key: &TokenKey) -> Result<bool, AppError> {
        let raw = key.to_string();
        if self.live_deadline(&raw).is_none() {
            return Ok(false);
        }
        Ok(self.entries.lock().remove(&raw).is_some())
    }

    async fn rename(&self, from: &TokenKey, to: &TokenKey) -> Result<bool, AppError> {
        let from_raw = from.to_string();
        if self.live_deadline(&from_raw).is_none() {
            return Ok(false);
        }
        let mut entries = self.entries.lock();
        match entries.remove(&from_raw) {
            Some(deadline) => {
                entries.insert(to.to_string(), deadline);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn expire_at(&self, key: &TokenKey, expires_at: DateTime<Utc>) -> Result<bool, AppError> {
        let raw = key.to_string();
        if self.live_deadline(&raw).is_none() {
            return Ok(false);
        }
        let updated = match self.entries.lock().get_mut(&raw) {
            Some(deadline) => {
                *deadline = expires_at;
                true
            }
            None => false,
        };
        if updated && expires_at <= Utc::now() {
            self.live_deadline(&raw);
        }
        Ok(updated)
    }

    async fn expires_at(&self, key: &TokenKey) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self.live_deadline(&key.to_string()))
    }

    async fn subscribe_expired(&self) -> Result<BoxStream<'static, String>, AppError> {
        let receiver = self.expired.subscribe();
        let stream = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(key) => return Some((key, receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("expiry subscriber lagged, {} notifications dropped", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
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

    fn key(token: &str) -> TokenKey {
        TokenKey::new(TokenKind::Signup, token)
    }

    #[tokio::test]
    async fn test_set_exists_delete() {
        let store = MemoryTokenStore::new();
        let deadline = Utc::now() + chrono::Duration::minutes(5);

        store.set_until(&key("a"), deadline).await.unwrap();
        assert!(store.exists(&key("a")).await.unwrap());
        assert_eq!(store.expires_at(&key("a")).await.unwrap(), Some(deadline));

        assert!(store.delete(&key("a")).await.unwrap());
        assert!(!store.delete(&key("a")).await.unwrap());
        assert!(!store.exists(&key("a")).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_keeps_deadline() {
        let store = MemoryTokenStore::new();
        let deadline = Utc::now() + chrono::Duration::minutes(5);
        store.set_until(&key("old"), deadline).await.unwrap();

        assert!(store.rename(&key("old"), &key("new")).await.unwrap());
        assert!(!store.contains(&key("old")));
        assert_eq!(store.expires_at(&key("new")).await.unwrap(), Some(deadline));

        assert!(!store.rename(&key("missing"), &key("other")).await.unwrap());
    }

    #[tokio::test]
    async fn test_past_deadline_expires_and_publishes() {
        let store = MemoryTokenStore::new();
        let mut expired = store.subscribe_expired().await.unwrap();

        store
            .set_until(&key("late"), Utc::now() + chrono::Duration::milliseconds(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(expired.next().await.unwrap(), "signupToken:late");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_lazy_expiry_on_access() {
        let store = MemoryTokenStore::new();
        let mut expired = store.subscribe_expired().await.unwrap();
        store
            .set_until(&key("lazy"), Utc::now() + chrono::Duration::milliseconds(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(!store.exists(&key("lazy")).await.unwrap());
        assert_eq!(expired.next().await.unwrap(), "signupToken:lazy");
    }

    #[tokio::test]
    async fn test_expire_now() {
        let store = MemoryTokenStore::new();
        let mut expired = store.subscribe_expired().await.unwrap();
        store
            .set_until(&key("x"), Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap();

        assert!(store.expire_now(&key("x")));
        assert!(!store.expire_now(&key("x")));
        assert_eq!(expired.next().await.unwrap(), "signupToken:x");
    }
}
