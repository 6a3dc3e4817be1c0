use std::io;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use chrono::Duration;
use sqlx::postgres::PgPoolOptions;

use timekeeper::{
    auth::AuthMiddleware,
    config::{Config, StorageBackend},
    error::AppError,
    notify::{LogNotifier, Notifier},
    routes,
    session::RedisSessionStore,
    state::{AppState, AuthSettings},
    store::PgStore,
    tokens::{ExpiryListener, RedisTokenStore, TokenService, TokenStore},
};

const MEMORY_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(1);

/// Connects Postgres and Redis and builds the shared state.
async fn connect_services(
    config: &Config,
    auth: AuthSettings,
    notifier: Arc<dyn Notifier>,
    lifetime: Duration,
) -> Result<(AppState, ExpiryListener), AppError> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::InternalServerError("DATABASE_URL must be set".into()))?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    let store = Arc::new(PgStore::new(pool));
    if config.run_migrations {
        store.migrate().await?;
        log::info!("database migrations applied");
    }

    let redis = RedisTokenStore::connect(&config.redis_url, config.redis_db).await?;
    redis.ping().await?;
    if config.redis_configure_notifications {
        redis.enable_expiry_notifications().await?;
    }
    let sessions = Arc::new(RedisSessionStore::new(redis.connection()));
    let tokens: Arc<dyn TokenStore> = Arc::new(redis);

    let state = AppState {
        users: store.clone(),
        timers: store.clone(),
        routines: store.clone(),
        sessions,
        tokens: Arc::new(TokenService::new(
            store.clone(),
            tokens.clone(),
            notifier,
            lifetime,
        )),
        auth,
    };
    Ok((state, ExpiryListener::new(store, tokens)))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier::new(config.app_url.clone()));
    let lifetime = Duration::minutes(config.verification_lifetime_minutes);
    let auth = AuthSettings::from_config(&config);

    let (state, listener, sweeper) = match config.storage_backend {
        StorageBackend::Memory => {
            log::warn!("using in-memory storage; nothing survives a restart");
            let (state, backends) = AppState::in_memory(auth, notifier, lifetime);
            let sweeper = backends.tokens.clone().spawn_sweeper(MEMORY_SWEEP_INTERVAL);
            (state, backends.listener(), Some(sweeper))
        }
        StorageBackend::Postgres => {
            let (state, listener) = connect_services(&config, auth, notifier, lifetime)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            (state, listener, None)
        }
    };
    let listener_task = listener.spawn();

    let data = web::Data::new(state);
    let app_url = config.app_url.clone();

    log::info!("Starting timekeeper server at {}", config.server_url());
    let result = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&app_url)
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(data.clone())
            .wrap(AuthMiddleware)
            .wrap(cors)
            .wrap(Logger::default())
            .configure(routes::config)
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await;

    listener_task.abort();
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    log::info!("timekeeper server stopped");
    result
}
