//! Delivery of verification tokens to users.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::AppError;
use crate::tokens::TokenKind;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_token(&self, recipient: &str, token: &str, kind: TokenKind) -> Result<(), AppError>;
}

/// Builds the link a user follows to present `token`.
pub fn verification_link(app_url: &str, token: &str, kind: TokenKind) -> String {
    let path = match kind {
        TokenKind::Signup => "verify-signup",
        TokenKind::ResetPassword => "reset-password",
        TokenKind::ChangeEmail => "verify-change-email",
    };
    format!("{}/{}?token={}", app_url.trim_end_matches('/'), path, token)
}

/// Writes each message to the log instead of sending it.
pub struct LogNotifier {
    app_url: String,
}

impl LogNotifier {
    pub fn new(app_url: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_token(&self, recipient: &str, token: &str, kind: TokenKind) -> Result<(), AppError> {
        log::info!(
            "{} for {}: {}",
            kind,
            recipient,
            verification_link(&self.app_url, token, kind)
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentToken {
    pub recipient: String,
    pub token: String,
    pub kind: TokenKind,
}

/// Keeps every delivered token in memory. Deliveries can be made to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentToken>>,
    failing: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deliveries(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn sent(&self) -> Vec<SentToken> {
        self.sent.lock().clone()
    }

    /// Most recent token of `kind` delivered to `recipient`.
    pub fn last_token(&self, recipient: &str, kind: TokenKind) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|s| s.recipient == recipient && s.kind == kind)
            .map(|s| s.token.clone())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_token(&self, recipient: &str, token: &str, kind: TokenKind) -> Result<(), AppError> {
        if *self.failing.lock() {
            return Err(AppError::NotificationFailure(format!(
                "delivery to {} refused",
                recipient
            )));
        }
        self.sent.lock().push(SentToken {
            recipient: recipient.to_string(),
            token: token.to_string(),
            kind,
        });
        Ok(())
    }
}
