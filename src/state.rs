use std::sync::Arc;

use chrono::Duration;

use crate::config::Config;
use crate::notify::Notifier;
use crate::session::{MemorySessionStore, SessionStore};
use crate::store::{MemoryStore, RoutineStore, TimerStore, UserStore};
use crate::tokens::{ExpiryListener, MemoryTokenStore, TokenService, TokenStore};

/// Credentials and cookie policy shared by the auth handlers.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub access_lifetime: Duration,
    pub refresh_lifetime: Duration,
    pub bcrypt_cost: u32,
    pub cookie_secure: bool,
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            access_lifetime: Duration::days(config.access_lifetime_days),
            refresh_lifetime: Duration::days(config.refresh_lifetime_days),
            bcrypt_cost: config.bcrypt_cost,
            cookie_secure: config.cookie_secure,
        }
    }
}

/// Everything a request handler needs, registered once as `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub timers: Arc<dyn TimerStore>,
    pub routines: Arc<dyn RoutineStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub tokens: Arc<TokenService>,
    pub auth: AuthSettings,
}

/// Concrete handles of an in-memory [`AppState`].
#[derive(Clone)]
pub struct MemoryBackends {
    pub store: Arc<MemoryStore>,
    pub tokens: Arc<MemoryTokenStore>,
}

impl MemoryBackends {
    pub fn listener(&self) -> ExpiryListener {
        ExpiryListener::new(self.store.clone(), self.tokens.clone())
    }
}

impl AppState {
    /// Builds a fully in-process state. `verification_lifetime` applies to
    /// every verification token.
    pub fn in_memory(
        auth: AuthSettings,
        notifier: Arc<dyn Notifier>,
        verification_lifetime: Duration,
    ) -> (Self, MemoryBackends) {
        let store = Arc::new(MemoryStore::new());
        let tokens = Arc::new(MemoryTokenStore::new());
        let token_store: Arc<dyn TokenStore> = tokens.clone();

        let state = Self {
            users: store.clone(),
            timers: store.clone(),
            routines: store.clone(),
            sessions: Arc::new(MemorySessionStore::new()),
            tokens: Arc::new(TokenService::new(
                store.clone(),
                token_store,
                notifier,
                verification_lifetime,
            )),
            auth,
        };
        (state, MemoryBackends { store, tokens })
    }
}
