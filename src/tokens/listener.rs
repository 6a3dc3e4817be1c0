//! Reconciles the user store when a token key expires.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use tokio::task::JoinHandle;

use super::{TokenKey, TokenKind, TokenStore};
use crate::error::AppError;
use crate::store::UserStore;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// What handling one expired key did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// An unverified account was removed with its timers and routines.
    UserDeleted,
    /// A pending reset-password or change-email token was cleared.
    TokenCleared,
    /// No account carries the token any more.
    NothingToDo,
    /// The key does not belong to a token namespace.
    Ignored,
}

#[derive(Clone)]
pub struct ExpiryListener {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
}

impl ExpiryListener {
    pub fn new(users: Arc<dyn UserStore>, tokens: Arc<dyn TokenStore>) -> Self {
        Self { users, tokens }
    }

    pub async fn handle_key(&self, raw: &str) -> Result<Reconciliation, AppError> {
        let key = match TokenKey::parse(raw) {
            Some(key) => key,
            None => return Ok(Reconciliation::Ignored),
        };

        let user = match self.users.find_by_token(key.kind, &key.token).await? {
            Some(user) => user,
            None => {
                log::debug!("{} expired but no user carries it", key);
                return Ok(Reconciliation::NothingToDo);
            }
        };

        let (rows, outcome) = match key.kind {
            TokenKind::Signup => (
                self.users.delete_pending_signup(user.id, &key.token).await?,
                Reconciliation::UserDeleted,
            ),
            kind => (
                self.users.clear_token(kind, &key.token).await?,
                Reconciliation::TokenCleared,
            ),
        };

        if rows == 0 {
            // Verified or renewed between the lookup and the write.
            log::debug!("{} was settled before reconciliation", key);
            return Ok(Reconciliation::NothingToDo);
        }
        log::info!("{} expired for user {}: {:?}", key.kind, user.id, outcome);
        Ok(outcome)
    }

    /// Handles every key of `expired` until the stream ends and returns how
    /// many keys it received.
    pub async fn consume(&self, mut expired: BoxStream<'static, String>) -> usize {
        let mut delivered = 0;
        while let Some(raw) = expired.next().await {
            delivered += 1;
            if let Err(e) = self.handle_key(&raw).await {
                log::error!("failed to reconcile expired key {}: {}", raw, e);
            }
        }
        delivered
    }

    /// Runs the listener on its own task, resubscribing with exponential
    /// backoff whenever the subscription fails or ends.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;
            loop {
                let delivered = match self.tokens.subscribe_expired().await {
                    Ok(expired) => {
                        log::info!("token expiry listener started");
                        let delivered = self.consume(expired).await;
                        log::warn!("token expiry stream ended after {} keys", delivered);
                        delivered
                    }
                    Err(e) => {
                        log::error!("cannot subscribe to token expiry: {}", e);
                        0
                    }
                };
                let delay = backoff_after(backoff, delivered);
                log::info!("resubscribing to token expiry in {:?}", delay);
                tokio::time::sleep(delay).await;
                backoff = (delay * 2).min(MAX_BACKOFF);
            }
        })
    }
}

/// Delay before the next subscription. Only a subscription that delivered
/// keys counts as healthy and resets the backoff; one that subscribes and
/// drops straight away keeps growing it.
fn backoff_after(current: Duration, delivered: usize) -> Duration {
    if delivered > 0 {
        INITIAL_BACKOFF
    } else {
        current
    }
}
