use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{RoutineStore, TimerStore, UserStore};
use crate::error::AppError;
use crate::models::{NewUser, Routine, SaveRoutineRequest, Timer, User};
use crate::tokens::{TokenKind, Transition};

const USER_COLUMNS: &str = "id, email, username, password_hash, signup_token, \
     reset_password_token, change_email_token, new_email, created_at, updated_at";

const TIMER_COLUMNS: &str = "timer_id, name, duration, count, sort_order, color";

/// Postgres implementation of every store trait over one pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::StoreUnavailable(format!("migration failed: {}", e)))
    }
}

#[derive(FromRow)]
struct RoutineRow {
    id: String,
    name: String,
    count: i32,
}

#[derive(FromRow)]
struct RoutineTimerRow {
    routine_id: String,
    #[sqlx(flatten)]
    timer: Timer,
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (id, email, username, password_hash, signup_token)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(user.email)
            .bind(user.username)
            .bind(user.password_hash)
            .bind(user.signup_token)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_token(&self, kind: TokenKind, token: &str) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {} FROM users WHERE {} = $1",
            USER_COLUMNS,
            kind.column()
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn set_token(
        &self,
        email: &str,
        kind: TokenKind,
        token: &str,
        new_email: Option<&str>,
    ) -> Result<u64, AppError> {
        let result = match kind {
            TokenKind::ChangeEmail => {
                sqlx::query(
                    "UPDATE users SET change_email_token = $2, new_email = $3, updated_at = NOW()
                     WHERE email = $1",
                )
                .bind(email)
                .bind(token)
                .bind(new_email)
                .execute(&self.pool)
                .await?
            }
            kind => {
                let sql = format!(
                    "UPDATE users SET {} = $2, updated_at = NOW() WHERE email = $1",
                    kind.column()
                );
                sqlx::query(&sql)
                    .bind(email)
                    .bind(token)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn replace_token(
        &self,
        email: &str,
        kind: TokenKind,
        old: &str,
        new: &str,
    ) -> Result<u64, AppError> {
        let sql = format!(
            "UPDATE users SET {col} = $3, updated_at = NOW() WHERE email = $1 AND {col} = $2",
            col = kind.column()
        );
        let result = sqlx::query(&sql)
            .bind(email)
            .bind(old)
            .bind(new)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn consume_token(
        &self,
        id: Uuid,
        token: &str,
        transition: &Transition,
    ) -> Result<u64, AppError> {
        let result = match transition {
            Transition::ConfirmSignup => {
                sqlx::query(
                    "UPDATE users SET signup_token = NULL, updated_at = NOW()
                     WHERE id = $1 AND signup_token = $2",
                )
                .bind(id)
                .bind(token)
                .execute(&self.pool)
                .await?
            }
            Transition::ResetPassword { password_hash } => {
                sqlx::query(
                    "UPDATE users SET password_hash = $3, reset_password_token = NULL, updated_at = NOW()
                     WHERE id = $1 AND reset_password_token = $2",
                )
                .bind(id)
                .bind(token)
                .bind(password_hash)
                .execute(&self.pool)
                .await?
            }
            Transition::ConfirmEmailChange => {
                sqlx::query(
                    "UPDATE users
                     SET email = new_email, change_email_token = NULL, new_email = NULL, updated_at = NOW()
                     WHERE id = $1 AND change_email_token = $2 AND new_email IS NOT NULL",
                )
                .bind(id)
                .bind(token)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected())
    }

    async fn clear_token(&self, kind: TokenKind, token: &str) -> Result<u64, AppError> {
        let extra = match kind {
            TokenKind::ChangeEmail => ", new_email = NULL",
            _ => "",
        };
        let sql = format!(
            "UPDATE users SET {col} = NULL{extra}, updated_at = NOW() WHERE {col} = $1",
            col = kind.column(),
            extra = extra
        );
        let result = sqlx::query(&sql).bind(token).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_pending_signup(&self, id: Uuid, token: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1 AND signup_token = $2")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn update_username(&self, id: Uuid, username: &str) -> Result<Option<User>, AppError> {
        let sql = format!(
            "UPDATE users SET username = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn delete_user(&self, id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl TimerStore for PgStore {
    async fn list_timers(&self, user_id: Uuid) -> Result<Vec<Timer>, AppError> {
        let sql = format!(
            "SELECT {} FROM timers WHERE user_id = $1 ORDER BY sort_order, timer_id",
            TIMER_COLUMNS
        );
        let timers = sqlx::query_as::<_, Timer>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(timers)
    }

    async fn replace_timers(&self, user_id: Uuid, timers: &[Timer]) -> Result<Vec<Timer>, AppError> {
        let ids: Vec<String> = timers.iter().map(|t| t.timer_id.clone()).collect();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM timers WHERE user_id = $1 AND NOT (timer_id = ANY($2))")
            .bind(user_id)
            .bind(&ids)
            .execute(&mut *tx)
            .await?;

        for timer in timers {
            sqlx::query(
                "INSERT INTO timers (user_id, timer_id, name, duration, count, sort_order, color)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (user_id, timer_id) DO UPDATE
                 SET name = EXCLUDED.name, duration = EXCLUDED.duration, count = EXCLUDED.count,
                     sort_order = EXCLUDED.sort_order, color = EXCLUDED.color",
            )
            .bind(user_id)
            .bind(&timer.timer_id)
            .bind(&timer.name)
            .bind(timer.duration)
            .bind(timer.count)
            .bind(timer.order)
            .bind(&timer.color)
            .execute(&mut *tx)
            .await?;
        }

        let sql = format!(
            "SELECT {} FROM timers WHERE user_id = $1 ORDER BY sort_order, timer_id",
            TIMER_COLUMNS
        );
        let saved = sqlx::query_as::<_, Timer>(&sql)
            .bind(user_id)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(saved)
    }
}

#[async_trait]
impl RoutineStore for PgStore {
    async fn list_routines(&self, user_id: Uuid) -> Result<Vec<Routine>, AppError> {
        let rows = sqlx::query_as::<_, RoutineRow>(
            "SELECT id, name, count FROM routines WHERE user_id = $1 ORDER BY created_at, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let links = sqlx::query_as::<_, RoutineTimerRow>(
            "SELECT rt.routine_id, t.timer_id, t.name, t.duration, t.count, t.sort_order, t.color
             FROM routine_timers rt
             JOIN timers t ON t.user_id = rt.user_id AND t.timer_id = rt.timer_id
             WHERE rt.user_id = $1
             ORDER BY rt.routine_id, rt.position",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut data: HashMap<String, Vec<Timer>> = HashMap::new();
        for link in links {
            data.entry(link.routine_id).or_default().push(link.timer);
        }

        Ok(rows
            .into_iter()
            .map(|row| Routine {
                data: data.remove(&row.id).unwrap_or_default(),
                id: row.id,
                name: row.name,
                count: row.count,
            })
            .collect())
    }

    async fn save_routine(
        &self,
        user_id: Uuid,
        routine: &SaveRoutineRequest,
    ) -> Result<Routine, AppError> {
        let ids = routine.timer_ids();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {} FROM timers WHERE user_id = $1 AND timer_id = ANY($2)",
            TIMER_COLUMNS
        );
        let owned: HashMap<String, Timer> = sqlx::query_as::<_, Timer>(&sql)
            .bind(user_id)
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|t| (t.timer_id.clone(), t))
            .collect();

        let data = ids
            .iter()
            .map(|id| {
                owned
                    .get(id)
                    .cloned()
                    .ok_or_else(|| AppError::BadRequest(format!("Unknown timer: {}", id)))
            })
            .collect::<Result<Vec<Timer>, AppError>>()?;

        sqlx::query(
            "INSERT INTO routines (user_id, id, name, count) VALUES ($1, $2, $3, $4)
             ON CONFLICT (user_id, id) DO UPDATE SET name = EXCLUDED.name, count = EXCLUDED.count",
        )
        .bind(user_id)
        .bind(&routine.id)
        .bind(&routine.name)
        .bind(routine.count)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM routine_timers WHERE user_id = $1 AND routine_id = $2")
            .bind(user_id)
            .bind(&routine.id)
            .execute(&mut *tx)
            .await?;

        for (position, timer_id) in ids.iter().enumerate() {
            sqlx::query(
                "INSERT INTO routine_timers (user_id, routine_id, timer_id, position)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(user_id)
            .bind(&routine.id)
            .bind(timer_id)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Routine {
            id: routine.id.clone(),
            name: routine.name.clone(),
            count: routine.count,
            data,
        })
    }

    async fn delete_routine(&self, user_id: Uuid, routine_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM routines WHERE user_id = $1 AND id = $2")
            .bind(user_id)
            .bind(routine_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
