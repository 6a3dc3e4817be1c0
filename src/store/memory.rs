//! In-process store used by the `memory` backend and the test suite.
//!
//! Mirrors the Postgres schema closely enough for the service to rely on
//! the same guarantees: unique email and username, conditional updates that
//! report affected rows, and cascading deletes from users to timers and
//! routines.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{RoutineStore, TimerStore, UserStore};
use crate::error::AppError;
use crate::models::{NewUser, Routine, SaveRoutineRequest, Timer, User};
use crate::tokens::{TokenKind, Transition};

#[derive(Debug, Clone)]
struct StoredRoutine {
    id: String,
    name: String,
    count: i32,
    timer_ids: Vec<String>,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    timers: HashMap<Uuid, Vec<Timer>>,
    routines: HashMap<Uuid, Vec<StoredRoutine>>,
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }

    fn username_taken(&self, username: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id) != except)
    }

    fn by_email_mut(&mut self, email: &str) -> Option<&mut User> {
        self.users.values_mut().find(|u| u.email == email)
    }

    fn remove_user(&mut self, id: Uuid) -> bool {
        self.timers.remove(&id);
        self.routines.remove(&id);
        self.users.remove(&id).is_some()
    }
}

fn column_mut(user: &mut User, kind: TokenKind) -> &mut Option<String> {
    match kind {
        TokenKind::Signup => &mut user.signup_token,
        TokenKind::ResetPassword => &mut user.reset_password_token,
        TokenKind::ChangeEmail => &mut user.change_email_token,
    }
}

fn holds(user: &User, kind: TokenKind, token: &str) -> bool {
    let column = match kind {
        TokenKind::Signup => &user.signup_token,
        TokenKind::ResetPassword => &user.reset_password_token,
        TokenKind::ChangeEmail => &user.change_email_token,
    };
    column.as_deref() == Some(token)
}

fn routine_view(routine: &StoredRoutine, timers: &[Timer]) -> Routine {
    Routine {
        id: routine.id.clone(),
        name: routine.name.clone(),
        count: routine.count,
        data: routine
            .timer_ids
            .iter()
            .filter_map(|id| timers.iter().find(|t| &t.timer_id == id).cloned())
            .collect(),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.tables.read().users.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut tables = self.tables.write();
        if tables.email_taken(&user.email, None) {
            return Err(AppError::DuplicateIdentity("email".into()));
        }
        if tables.username_taken(&user.username, None) {
            return Err(AppError::DuplicateIdentity("username".into()));
        }

        let now = Utc::now();
        let row = User {
            id: user.id,
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            signup_token: Some(user.signup_token),
            reset_password_token: None,
            change_email_token: None,
            new_email: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.read();
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.read();
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_token(&self, kind: TokenKind, token: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.read();
        Ok(tables
            .users
            .values()
            .find(|u| holds(u, kind, token))
            .cloned())
    }

    async fn set_token(
        &self,
        email: &str,
        kind: TokenKind,
        token: &str,
        new_email: Option<&str>,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.write();
        let user = match tables.by_email_mut(email) {
            Some(user) => user,
            None => return Ok(0),
        };
        *column_mut(user, kind) = Some(token.to_string());
        if kind == TokenKind::ChangeEmail {
            user.new_email = new_email.map(str::to_string);
        }
        user.updated_at = Utc::now();
        Ok(1)
    }

    async fn replace_token(
        &self,
        email: &str,
        kind: TokenKind,
        old: &str,
        new: &str,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.write();
        match tables.by_email_mut(email) {
            Some(user) if holds(user, kind, old) => {
                *column_mut(user, kind) = Some(new.to_string());
                user.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn consume_token(
        &self,
        id: Uuid,
        token: &str,
        transition: &Transition,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.write();
        let kind = transition.kind();
        let pending_email = match tables.users.get(&id) {
            Some(user) if holds(user, kind, token) => user.new_email.clone(),
            _ => return Ok(0),
        };

        if *transition == Transition::ConfirmEmailChange {
            match &pending_email {
                Some(email) if tables.email_taken(email, Some(id)) => {
                    return Err(AppError::DuplicateIdentity("email".into()));
                }
                Some(_) => {}
                None => return Ok(0),
            }
        }

        let user = match tables.users.get_mut(&id) {
            Some(user) => user,
            None => return Ok(0),
        };
        match transition {
            Transition::ConfirmSignup => user.signup_token = None,
            Transition::ResetPassword { password_hash } => {
                user.password_hash = password_hash.clone();
                user.reset_password_token = None;
            }
            Transition::ConfirmEmailChange => {
                if let Some(email) = user.new_email.take() {
                    user.email = email;
                }
                user.change_email_token = None;
            }
        }
        user.updated_at = Utc::now();
        Ok(1)
    }

    async fn clear_token(&self, kind: TokenKind, token: &str) -> Result<u64, AppError> {
        let mut tables = self.tables.write();
        let mut cleared = 0;
        for user in tables.users.values_mut().filter(|u| holds(u, kind, token)) {
            *column_mut(user, kind) = None;
            if kind == TokenKind::ChangeEmail {
                user.new_email = None;
            }
            user.updated_at = Utc::now();
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn delete_pending_signup(&self, id: Uuid, token: &str) -> Result<u64, AppError> {
        let mut tables = self.tables.write();
        let pending = matches!(tables.users.get(&id), Some(u) if holds(u, TokenKind::Signup, token));
        if pending && tables.remove_user(id) {
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn update_username(&self, id: Uuid, username: &str) -> Result<Option<User>, AppError> {
        let mut tables = self.tables.write();
        if tables.username_taken(username, Some(id)) {
            return Err(AppError::DuplicateIdentity("username".into()));
        }
        Ok(tables.users.get_mut(&id).map(|user| {
            user.username = username.to_string();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> Result<u64, AppError> {
        Ok(u64::from(self.tables.write().remove_user(id)))
    }
}

#[async_trait]
impl TimerStore for MemoryStore {
    async fn list_timers(&self, user_id: Uuid) -> Result<Vec<Timer>, AppError> {
        Ok(self
            .tables
            .read()
            .timers
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_timers(&self, user_id: Uuid, timers: &[Timer]) -> Result<Vec<Timer>, AppError> {
        let mut tables = self.tables.write();
        if !tables.users.contains_key(&user_id) {
            return Err(AppError::NotFound("User not found".into()));
        }

        let mut saved = timers.to_vec();
        saved.sort_by(|a, b| (a.order, &a.timer_id).cmp(&(b.order, &b.timer_id)));

        if let Some(routines) = tables.routines.get_mut(&user_id) {
            for routine in routines.iter_mut() {
                routine
                    .timer_ids
                    .retain(|id| saved.iter().any(|t| &t.timer_id == id));
            }
        }
        tables.timers.insert(user_id, saved.clone());
        Ok(saved)
    }
}

#[async_trait]
impl RoutineStore for MemoryStore {
    async fn list_routines(&self, user_id: Uuid) -> Result<Vec<Routine>, AppError> {
        let tables = self.tables.read();
        let timers = tables.timers.get(&user_id).map(Vec::as_slice).unwrap_or(&[]);
        Ok(tables
            .routines
            .get(&user_id)
            .map(|routines| routines.iter().map(|r| routine_view(r, timers)).collect())
            .unwrap_or_default())
    }

    async fn save_routine(
        &self,
        user_id: Uuid,
        routine: &SaveRoutineRequest,
    ) -> Result<Routine, AppError> {
        let mut tables = self.tables.write();
        if !tables.users.contains_key(&user_id) {
            return Err(AppError::NotFound("User not found".into()));
        }

        let timers = tables.timers.get(&user_id).cloned().unwrap_or_default();
        let timer_ids = routine.timer_ids();
        if let Some(unknown) = timer_ids
            .iter()
            .find(|id| !timers.iter().any(|t| &&t.timer_id == id))
        {
            return Err(AppError::BadRequest(format!("Unknown timer: {}", unknown)));
        }

        let stored = StoredRoutine {
            id: routine.id.clone(),
            name: routine.name.clone(),
            count: routine.count,
            timer_ids,
        };
        let routines = tables.routines.entry(user_id).or_default();
        match routines.iter_mut().find(|r| r.id == routine.id) {
            Some(existing) => *existing = stored.clone(),
            None => routines.push(stored.clone()),
        }
        Ok(routine_view(&stored, &timers))
    }

    async fn delete_routine(&self, user_id: Uuid, routine_id: &str) -> Result<u64, AppError> {
        let mut tables = self.tables.write();
        let routines = match tables.routines.get_mut(&user_id) {
            Some(routines) => routines,
            None => return Ok(0),
        };
        let before = routines.len();
        routines.retain(|r| r.id != routine_id);
        Ok((before - routines.len()) as u64)
    }
}
