//! Issuance, verification and renewal of verification tokens.
//!
//! The user row is the source of truth. Every operation writes the token store
//! first and compensates it when the user store write does not land, so the
//! two never point at different token values for longer than one call.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{generate_token, TokenKey, TokenKind, TokenStore};
use crate::error::AppError;
use crate::models::{NewUser, User};
use crate::notify::Notifier;
use crate::store::UserStore;

/// The column change a successful verification applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Clears `signup_token`; the account becomes verified.
    ConfirmSignup,
    /// Stores a new password hash and clears `reset_password_token`.
    ResetPassword { password_hash: String },
    /// Moves `new_email` into `email` and clears both pending columns.
    ConfirmEmailChange,
}

impl Transition {
    pub fn kind(&self) -> TokenKind {
        match self {
            Transition::ConfirmSignup => TokenKind::Signup,
            Transition::ResetPassword { .. } => TokenKind::ResetPassword,
            Transition::ConfirmEmailChange => TokenKind::ChangeEmail,
        }
    }
}

/// Progress of a single verification attempt.
///
/// ```text
/// Disarmed ──commit──────────────────────────▶ Committed
///     │
///     └──compensate(token still held, expiry ahead)──▶ Rearmed
///     └──compensate(otherwise)───────────────────────▶ Abandoned
/// ```
///
/// The token key is deleted before the conditional update runs. If the update
/// does not commit, the key is restored with its original expiry only while
/// some account still carries the token, so a consumed token stays consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    Disarmed { expires_at: DateTime<Utc> },
    Committed,
    Rearmed { expires_at: DateTime<Utc> },
    Abandoned,
}

impl Consumption {
    pub fn disarm(expires_at: DateTime<Utc>) -> Self {
        Consumption::Disarmed { expires_at }
    }

    pub fn commit(self) -> Self {
        match self {
            Consumption::Disarmed { .. } => Consumption::Committed,
            settled => settled,
        }
    }

    pub fn compensate(self, token_still_held: bool, now: DateTime<Utc>) -> Self {
        match self {
            Consumption::Disarmed { expires_at } if token_still_held && expires_at > now => {
                Consumption::Rearmed { expires_at }
            }
            Consumption::Disarmed { .. } => Consumption::Abandoned,
            settled => settled,
        }
    }
}

pub struct TokenService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
        lifetime: Duration,
    ) -> Self {
        Self {
            users,
            tokens,
            notifier,
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    fn fresh_deadline(&self) -> DateTime<Utc> {
        Utc::now() + self.lifetime
    }

    /// Inserts a new account with a pending signup token and sends it.
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password_hash: String,
    ) -> Result<User, AppError> {
        let token = generate_token();
        let key = TokenKey::new(TokenKind::Signup, token.clone());
        self.tokens.set_until(&key, self.fresh_deadline()).await?;

        let new_user = NewUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            username: username.to_string(),
            password_hash,
            signup_token: token.clone(),
        };
        let user = match self.users.insert_user(new_user).await {
            Ok(user) => user,
            Err(e) => {
                self.discard_key(&key).await;
                return Err(e);
            }
        };

        log::info!("registered user {}", user.id);
        self.notify(&user.email, &token, TokenKind::Signup).await;
        Ok(user)
    }

    /// Issues a token of `kind` for the account owning `email`, replacing any
    /// pending token of the same kind. `new_email` is the target address of a
    /// change-email token and is ignored otherwise.
    pub async fn issue(
        &self,
        email: &str,
        kind: TokenKind,
        new_email: Option<&str>,
    ) -> Result<String, AppError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;

        let new_email = match kind {
            TokenKind::ChangeEmail => Some(self.check_new_email(&user, new_email).await?),
            _ => None,
        };

        let token = generate_token();
        let key = TokenKey::new(kind, token.clone());
        self.tokens.set_until(&key, self.fresh_deadline()).await?;

        match self
            .users
            .set_token(email, kind, &token, new_email.as_deref())
            .await
        {
            Ok(rows) if rows > 0 => {}
            Ok(_) => {
                self.discard_key(&key).await;
                return Err(AppError::NotFound("User not found".into()));
            }
            Err(e) => {
                self.discard_key(&key).await;
                return Err(e);
            }
        }

        if let Some(previous) = pending_token(&user, kind) {
            self.discard_key(&TokenKey::new(kind, previous)).await;
        }

        let recipient = new_email.as_deref().unwrap_or(email);
        self.notify(recipient, &token, kind).await;
        Ok(token)
    }

    async fn check_new_email(&self, user: &User, new_email: Option<&str>) -> Result<String, AppError> {
        let new_email =
            new_email.ok_or_else(|| AppError::BadRequest("New email address is required".into()))?;
        if new_email == user.email {
            return Err(AppError::BadRequest(
                "New email address must differ from the current one".into(),
            ));
        }
        if self.users.find_by_email(new_email).await?.is_some() {
            return Err(AppError::DuplicateIdentity("email".into()));
        }
        Ok(new_email.to_string())
    }

    /// Consumes `token` by applying `transition` to the account holding it.
    /// Returns the account as stored after the change.
    pub async fn consume(&self, token: &str, transition: Transition) -> Result<User, AppError> {
        let kind = transition.kind();
        let key = TokenKey::new(kind, token);

        let user = match self.users.find_by_token(kind, token).await? {
            Some(user) => user,
            None => {
                self.discard_key(&key).await;
                return Err(AppError::InvalidToken);
            }
        };

        // An account still carrying a token whose key is gone holds an
        // expired token that the listener has not reconciled yet.
        let expires_at = match self.tokens.expires_at(&key).await? {
            Some(at) => at,
            None => return Err(AppError::InvalidToken),
        };
        self.tokens.delete(&key).await?;
        let consumption = Consumption::disarm(expires_at);

        match self.users.consume_token(user.id, token, &transition).await {
            Ok(rows) if rows > 0 => {
                let settled = consumption.commit();
                log::info!("{} consumed for user {} ({:?})", kind, user.id, settled);
            }
            Ok(_) => {
                self.compensate(consumption, &key).await;
                return Err(AppError::VerificationConflict);
            }
            Err(e) => {
                self.compensate(consumption, &key).await;
                return Err(e);
            }
        }

        self.users
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    async fn compensate(&self, consumption: Consumption, key: &TokenKey) -> Consumption {
        let still_held = match self.users.find_by_token(key.kind, &key.token).await {
            Ok(found) => found.is_some(),
            Err(e) => {
                log::error!("cannot decide whether to re-arm {}: {}", key, e);
                false
            }
        };

        let settled = consumption.compensate(still_held, Utc::now());
        if let Consumption::Rearmed { expires_at } = settled {
            if let Err(e) = self.tokens.set_until(key, expires_at).await {
                log::error!("failed to re-arm {}: {}", key, e);
                return Consumption::Abandoned;
            }
            log::debug!("re-armed {} until {}", key, expires_at);
        }
        settled
    }

    /// Checks that `token` is live without consuming it.
    pub async fn check(&self, kind: TokenKind, token: &str) -> Result<User, AppError> {
        let key = TokenKey::new(kind, token);
        if !self.tokens.exists(&key).await? {
            return Err(AppError::InvalidToken);
        }
        self.users
            .find_by_token(kind, token)
            .await?
            .ok_or(AppError::InvalidToken)
    }

    /// Replaces the pending token of `kind` for `email` with a fresh one and
    /// resends it. The new token gets a full lifetime.
    pub async fn renew(&self, email: &str, kind: TokenKind) -> Result<String, AppError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))?;
        let old = pending_token(&user, kind)
            .ok_or_else(|| AppError::NotFound(format!("No pending {}", kind)))?;

        let token = generate_token();
        let old_key = TokenKey::new(kind, old.clone());
        let new_key = TokenKey::new(kind, token.clone());

        let renamed = self.tokens.rename(&old_key, &new_key).await?;
        if !renamed {
            self.tokens.set_until(&new_key, self.fresh_deadline()).await?;
        }

        let committed = self.users.replace_token(email, kind, &old, &token).await;
        match committed {
            Ok(rows) if rows > 0 => {}
            Ok(_) => {
                self.undo_rename(renamed, &new_key, &old_key).await;
                return Err(AppError::VerificationConflict);
            }
            Err(e) => {
                self.undo_rename(renamed, &new_key, &old_key).await;
                return Err(e);
            }
        }

        self.tokens.expire_at(&new_key, self.fresh_deadline()).await?;

        let recipient = match kind {
            TokenKind::ChangeEmail => user.new_email.as_deref().unwrap_or(email),
            _ => email,
        };
        self.notify(recipient, &token, kind).await;
        Ok(token)
    }

    async fn undo_rename(&self, renamed: bool, new_key: &TokenKey, old_key: &TokenKey) {
        let undone = if renamed {
            self.tokens.rename(new_key, old_key).await.map(|_| ())
        } else {
            self.tokens.delete(new_key).await.map(|_| ())
        };
        if let Err(e) = undone {
            log::error!("failed to restore {} after renewal failure: {}", old_key, e);
        }
    }

    /// Deletes the token keys of every pending token `user` carries.
    pub async fn discard_pending(&self, user: &User) {
        for kind in TokenKind::ALL {
            if let Some(token) = pending_token(user, kind) {
                self.discard_key(&TokenKey::new(kind, token)).await;
            }
        }
    }

    async fn discard_key(&self, key: &TokenKey) {
        if let Err(e) = self.tokens.delete(key).await {
            log::warn!("failed to delete {}: {}", key, e);
        }
    }

    async fn notify(&self, recipient: &str, token: &str, kind: TokenKind) {
        if let Err(e) = self.notifier.send_token(recipient, token, kind).await {
            log::error!("failed to send {} to {}: {}", kind, recipient, e);
        }
    }
}

fn pending_token(user: &User, kind: TokenKind) -> Option<String> {
    match kind {
        TokenKind::Signup => user.signup_token.clone(),
        TokenKind::ResetPassword => user.reset_password_token.clone(),
        TokenKind::ChangeEmail => user.change_email_token.clone(),
    }
}
