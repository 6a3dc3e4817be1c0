#![allow(dead_code, unused_macros)]

use std::sync::Arc;

use actix_http::Request;
use actix_web::body::MessageBody;
use actix_web::cookie::Cookie;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::test;
use chrono::Duration;
use serde_json::{json, Value};

use timekeeper::notify::RecordingNotifier;
use timekeeper::state::{AppState, AuthSettings, MemoryBackends};
use timekeeper::tokens::TokenKind;

pub const JWT_SECRET: &str = "integration-test-secret";

pub struct TestContext {
    pub state: AppState,
    pub backends: MemoryBackends,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_lifetime(Duration::minutes(30))
    }

    pub fn with_lifetime(verification_lifetime: Duration) -> Self {
        let auth = AuthSettings {
            jwt_secret: JWT_SECRET.to_string(),
            access_lifetime: Duration::days(1),
            refresh_lifetime: Duration::days(14),
            bcrypt_cost: 4,
            cookie_secure: false,
        };
        let notifier = Arc::new(RecordingNotifier::new());
        let (state, backends) = AppState::in_memory(auth, notifier.clone(), verification_lifetime);
        Self {
            state,
            backends,
            notifier,
        }
    }

    /// The last token of `kind` sent to `email`.
    pub fn token_for(&self, email: &str, kind: TokenKind) -> String {
        self.notifier
            .last_token(email, kind)
            .unwrap_or_else(|| panic!("no {} sent to {}", kind, email))
    }
}

/// Builds the full application around the context's state.
macro_rules! init_app {
    ($ctx:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($ctx.state.clone()))
                .wrap(timekeeper::auth::AuthMiddleware)
                .configure(timekeeper::routes::config),
        )
        .await
    };
}

pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
    pub cookies: Vec<Cookie<'static>>,
}

impl Reply {
    pub fn cookie(&self, name: &str) -> Option<Cookie<'static>> {
        self.cookies.iter().find(|c| c.name() == name).cloned()
    }
}

/// Calls the service and decodes the reply, turning middleware errors into
/// the response a client would see.
pub async fn send<S, B>(app: &S, req: Request) -> Reply
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    match test::try_call_service(app, req).await {
        Ok(resp) => {
            let status = resp.status();
            let cookies = resp
                .response()
                .cookies()
                .map(|c| c.into_owned())
                .collect();
            let bytes = test::read_body(resp).await;
            Reply {
                status,
                body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
                cookies,
            }
        }
        Err(err) => {
            let resp = err.error_response();
            let status = resp.status();
            let bytes = actix_web::body::to_bytes(resp.into_body())
                .await
                .unwrap_or_default();
            Reply {
                status,
                body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
                cookies: Vec::new(),
            }
        }
    }
}

pub fn register_body(email: &str, username: &str, password: &str) -> Value {
    json!({
        "email": email,
        "username": username,
        "password": password,
        "confirmPassword": password
    })
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

/// Registers an account and returns its access token.
pub async fn register_and_login<S, B>(app: &S, email: &str, username: &str, password: &str) -> String
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(register_body(email, username, password))
        .to_request();
    let reply = send(app, req).await;
    assert_eq!(reply.status, StatusCode::CREATED, "register failed: {}", reply.body);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": email, "password": password }))
        .to_request();
    let reply = send(app, req).await;
    assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.body);
    reply.body["accessToken"]
        .as_str()
        .expect("login returns an access token")
        .to_string()
}
