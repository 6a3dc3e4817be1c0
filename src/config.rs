use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Which store implementations the process wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Postgres for users/timers/routines, Redis for tokens and sessions.
    Postgres,
    /// Everything in process memory. Nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub run_migrations: bool,
    pub redis_url: String,
    pub redis_db: u8,
    pub redis_configure_notifications: bool,
    pub server_port: u16,
    pub server_host: String,
    pub jwt_secret: String,
    /// Access JWT lifetime in days.
    pub access_lifetime_days: i64,
    /// Refresh session lifetime in days.
    pub refresh_lifetime_days: i64,
    /// Lifetime of signup / reset / change-email tokens in minutes.
    pub verification_lifetime_minutes: i64,
    pub bcrypt_cost: u32,
    pub app_url: String,
    pub cookie_secure: bool,
}

fn var_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = var_or(name, default);
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_backend = match var_or("STORAGE_BACKEND", "postgres").as_str() {
            "postgres" => StorageBackend::Postgres,
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let config = Self {
            storage_backend,
            database_url,
            run_migrations: parse_var("RUN_MIGRATIONS", "true")?,
            redis_url: var_or("REDIS_URL", "redis://127.0.0.1:6379"),
            redis_db: parse_var("REDIS_DB", "0")?,
            redis_configure_notifications: parse_var("REDIS_CONFIGURE_NOTIFICATIONS", "false")?,
            server_port: parse_var("SERVER_PORT", "8080")?,
            server_host: var_or("SERVER_HOST", "127.0.0.1"),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            access_lifetime_days: parse_var("ACCESS_LIFETIME", "1")?,
            refresh_lifetime_days: parse_var("REFRESH_LIFETIME", "14")?,
            verification_lifetime_minutes: parse_var("VERIFICATION_LIFETIME", "30")?,
            bcrypt_cost: parse_var("BCRYPT_COST", "12")?,
            app_url: var_or("APP_URL", "http://localhost:3000"),
            cookie_secure: parse_var("COOKIE_SECURE", "true")?,
        };

        if config.verification_lifetime_minutes <= 0 {
            return Err(ConfigError::Invalid {
                name: "VERIFICATION_LIFETIME",
                value: config.verification_lifetime_minutes.to_string(),
            });
        }

        Ok(config)
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}
