#![doc = "The `timekeeper` library crate."]
#![doc = ""]
#![doc = "Accounts with email verification workflows (signup, password reset, email"]
#![doc = "change), refresh-token sessions and per-user timers and routines. Pending"]
#![doc = "verification tokens live on the user row and as expiring keys in a token"]
#![doc = "store whose expiry events are reconciled back into the user store."]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod tokens;

pub use crate::error::AppError;
pub use crate::state::AppState;
