use crate::{
    auth::{
        AuthResponse, AuthenticatedUser, ChangeNameRequest, ChangePasswordRequest,
        DeleteAccountRequest, EmailRequest, TokenQuery, ACCESS_COOKIE, REFRESH_COOKIE,
        RESET_PASSWORD_COOKIE,
    },
    error::AppError,
    handlers::{self, SuccessResponse},
    routes::{access_cookie, removal_cookie, reset_password_cookie},
    state::AppState,
};
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};

#[get("/verify-signup-token")]
pub async fn verify_signup_token(
    state: web::Data<AppState>,
    query: web::Query<TokenQuery>,
) -> Result<impl Responder, AppError> {
    handlers::users::verify_signup_token(&state, &query.token).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::ok()))
}

#[post("/send-reset-password-email")]
pub async fn send_reset_password_email(
    state: web::Data<AppState>,
    body: web::Json<EmailRequest>,
) -> Result<impl Responder, AppError> {
    handlers::users::send_reset_password_email(&state, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::ok()))
}

/// Landing page of a reset link. A live token is handed back as a cookie
/// for the following password change.
#[get("/verify-reset-password-token")]
pub async fn verify_reset_password_token(
    state: web::Data<AppState>,
    query: web::Query<TokenQuery>,
) -> Result<impl Responder, AppError> {
    let token = query.into_inner().token;
    handlers::users::check_reset_password_token(&state, &token).await?;
    Ok(HttpResponse::Ok()
        .cookie(reset_password_cookie(&state, token))
        .json(SuccessResponse::ok()))
}

#[post("/change-password")]
pub async fn change_password(
    state: web::Data<AppState>,
    body: web::Json<ChangePasswordRequest>,
    req: HttpRequest,
) -> Result<impl Responder, AppError> {
    let body = body.into_inner();
    let token = body
        .token
        .clone()
        .or_else(|| req.cookie(RESET_PASSWORD_COOKIE).map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::BadRequest("Missing reset password token".into()))?;

    handlers::users::change_password(&state, &token, body).await?;
    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(RESET_PASSWORD_COOKIE, "/api/users"))
        .json(SuccessResponse::ok()))
}

#[post("/send-change-email-token")]
pub async fn send_change_email_token(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<EmailRequest>,
) -> Result<impl Responder, AppError> {
    handlers::users::send_change_email_token(&state, &user.0, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::ok()))
}

#[get("/verify-change-email-token")]
pub async fn verify_change_email_token(
    state: web::Data<AppState>,
    query: web::Query<TokenQuery>,
) -> Result<impl Responder, AppError> {
    let (user, access_token) =
        handlers::users::verify_change_email_token(&state, &query.token).await?;
    Ok(HttpResponse::Ok()
        .cookie(access_cookie(&state, access_token.clone()))
        .json(AuthResponse {
            access_token,
            user: user.profile(),
        }))
}

#[post("/change-name")]
pub async fn change_name(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<ChangeNameRequest>,
) -> Result<impl Responder, AppError> {
    let (user, access_token) =
        handlers::users::change_name(&state, &user.0, body.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .cookie(access_cookie(&state, access_token.clone()))
        .json(AuthResponse {
            access_token,
            user: user.profile(),
        }))
}

#[post("/delete-account")]
pub async fn delete_account(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<DeleteAccountRequest>,
    req: HttpRequest,
) -> Result<impl Responder, AppError> {
    handlers::users::delete_account(&state, &user.0, body.into_inner()).await?;
    if let Some(refresh_token) = req.cookie(REFRESH_COOKIE) {
        handlers::auth::logout(&state, Some(refresh_token.value())).await?;
    }

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(ACCESS_COOKIE, "/"))
        .cookie(removal_cookie(REFRESH_COOKIE, "/api/auth"))
        .json(SuccessResponse::ok()))
}
