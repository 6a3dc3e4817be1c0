//! Relational persistence behind traits, so handlers and the token service
//! run unchanged against Postgres or the in-process store.
//!
//! Every conditional write returns the number of affected rows; callers
//! treat `0` as "the row no longer matches" rather than as an error.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewUser, Routine, SaveRoutineRequest, Timer, User};
use crate::tokens::{TokenKind, Transition};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `DuplicateIdentity` when the email or username is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    /// Looks up the account whose `kind` column holds `token`.
    async fn find_by_token(&self, kind: TokenKind, token: &str) -> Result<Option<User>, AppError>;

    /// Overwrites the `kind` column of the account owning `email`. For
    /// change-email tokens `new_email` is written alongside.
    async fn set_token(
        &self,
        email: &str,
        kind: TokenKind,
        token: &str,
        new_email: Option<&str>,
    ) -> Result<u64, AppError>;

    /// Swaps `old` for `new` only while the column still holds `old`.
    async fn replace_token(
        &self,
        email: &str,
        kind: TokenKind,
        old: &str,
        new: &str,
    ) -> Result<u64, AppError>;

    /// Applies `transition` only while the account still holds `token`.
    async fn consume_token(
        &self,
        id: Uuid,
        token: &str,
        transition: &Transition,
    ) -> Result<u64, AppError>;

    /// Nulls the `kind` column wherever it holds `token`. Clearing a
    /// change-email token also clears `new_email`.
    async fn clear_token(&self, kind: TokenKind, token: &str) -> Result<u64, AppError>;

    /// Deletes the account only while it is unverified with this signup token.
    async fn delete_pending_signup(&self, id: Uuid, token: &str) -> Result<u64, AppError>;

    async fn update_username(&self, id: Uuid, username: &str) -> Result<Option<User>, AppError>;

    /// Deletes the account together with its timers and routines.
    async fn delete_user(&self, id: Uuid) -> Result<u64, AppError>;
}

#[async_trait]
pub trait TimerStore: Send + Sync {
    /// Timers of `user_id` by ascending `order`.
    async fn list_timers(&self, user_id: Uuid) -> Result<Vec<Timer>, AppError>;

    /// Makes `timers` the complete inventory of `user_id`: listed timers are
    /// upserted, unlisted ones are removed (and drop out of routines).
    async fn replace_timers(&self, user_id: Uuid, timers: &[Timer]) -> Result<Vec<Timer>, AppError>;
}

#[async_trait]
pub trait RoutineStore: Send + Sync {
    async fn list_routines(&self, user_id: Uuid) -> Result<Vec<Routine>, AppError>;

    /// Upserts the routine and replaces its timer list. Every referenced
    /// timer must belong to `user_id`.
    async fn save_routine(
        &self,
        user_id: Uuid,
        routine: &SaveRoutineRequest,
    ) -> Result<Routine, AppError>;

    async fn delete_routine(&self, user_id: Uuid, routine_id: &str) -> Result<u64, AppError>;
}
