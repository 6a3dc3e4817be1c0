use crate::{
    auth::{
        AuthResponse, AuthenticatedUser, EmailRequest, LoginRequest, RegisterRequest,
        ResendEmailRequest, UsernameRequest, ACCESS_COOKIE, REFRESH_COOKIE,
    },
    error::AppError,
    handlers::{self, SuccessResponse},
    routes::{access_cookie, refresh_cookie, removal_cookie},
    state::AppState,
    tokens::TokenKind,
};
use actix_web::{delete, get, patch, post, web, HttpRequest, HttpResponse, Responder};
use serde_json::json;
use validator::Validate;

/// Register a new user
///
/// Creates an unverified account and sends its signup token.
#[post("/register")]
pub async fn register(
    state: web::Data<AppState>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    handlers::auth::register(&state, register_data.into_inner()).await?;
    Ok(HttpResponse::Created().json(SuccessResponse::ok()))
}

/// Login user
///
/// Returns an access token and opens a refresh session carried by an
/// HttpOnly cookie.
#[post("/login")]
pub async fn login(
    state: web::Data<AppState>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    let session = handlers::auth::login(&state, login_data.into_inner()).await?;

    Ok(HttpResponse::Ok()
        .cookie(access_cookie(&state, session.access_token.clone()))
        .cookie(refresh_cookie(&state, session.refresh_token))
        .json(AuthResponse {
            access_token: session.access_token,
            user: session.user.profile(),
        }))
}

#[get("/refresh")]
pub async fn refresh(state: web::Data<AppState>, req: HttpRequest) -> Result<impl Responder, AppError> {
    let refresh_token = req
        .cookie(REFRESH_COOKIE)
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".into()))?;
    let (user, access_token) = handlers::auth::refresh(&state, refresh_token.value()).await?;

    Ok(HttpResponse::Ok()
        .cookie(access_cookie(&state, access_token.clone()))
        .json(AuthResponse {
            access_token,
            user: user.profile(),
        }))
}

#[patch("/check-duplicate-email")]
pub async fn check_duplicate_email(
    state: web::Data<AppState>,
    body: web::Json<EmailRequest>,
) -> Result<impl Responder, AppError> {
    let body = body.into_inner().normalized();
    body.validate()?;
    handlers::auth::check_duplicate_email(&state, &body.email).await?;
    Ok(HttpResponse::Ok().json(json!({ "email": body.email })))
}

#[patch("/check-duplicate-name")]
pub async fn check_duplicate_name(
    state: web::Data<AppState>,
    body: web::Json<UsernameRequest>,
) -> Result<impl Responder, AppError> {
    let body = body.into_inner().normalized();
    body.validate()?;
    handlers::auth::check_duplicate_name(&state, &body.username).await?;
    Ok(HttpResponse::Ok().json(json!({ "username": body.username })))
}

#[get("/me")]
pub async fn me(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let profile = handlers::auth::me(&state, &user.0).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[delete("/logout")]
pub async fn logout(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    req: HttpRequest,
) -> Result<impl Responder, AppError> {
    let refresh_token = req.cookie(REFRESH_COOKIE);
    handlers::auth::logout(&state, refresh_token.as_ref().map(|c| c.value())).await?;

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(ACCESS_COOKIE, "/"))
        .cookie(removal_cookie(REFRESH_COOKIE, "/api/auth"))
        .json(SuccessResponse::ok()))
}

/// Renews the caller's pending verification token and resends it.
#[post("/resend-email")]
pub async fn resend_email(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: Option<web::Json<ResendEmailRequest>>,
) -> Result<impl Responder, AppError> {
    let kind = body
        .and_then(|b| b.into_inner().event)
        .unwrap_or(TokenKind::Signup);
    handlers::auth::resend_email(&state, &user.0, kind).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::ok()))
}
