use validator::Validate;

use super::{access_token_for, current_user};
use crate::auth::{hash_password, verify_password, Claims, LoginRequest, RegisterRequest};
use crate::error::AppError;
use crate::models::{User, UserProfile};
use crate::state::AppState;
use crate::tokens::TokenKind;

/// A successful login: the account plus both credentials.
#[derive(Debug)]
pub struct LoginSession {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn register(state: &AppState, request: RegisterRequest) -> Result<User, AppError> {
    let request = request.normalized();
    request.validate()?;
    let password_hash = hash_password(&request.password, state.auth.bcrypt_cost)?;
    state
        .tokens
        .register(&request.email, &request.username, password_hash)
        .await
}

pub async fn login(state: &AppState, request: LoginRequest) -> Result<LoginSession, AppError> {
    let request = request.normalized();
    request.validate()?;

    let user = state
        .users
        .find_by_email(&request.email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Incorrect email or password".into()))?;
    if !verify_password(&request.password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Incorrect email or password".into()));
    }

    let access_token = access_token_for(state, &user)?;
    let refresh_token = state
        .sessions
        .create(user.id, state.auth.refresh_lifetime)
        .await?;
    log::info!("user {} logged in", user.id);

    Ok(LoginSession {
        user,
        access_token,
        refresh_token,
    })
}

/// Exchanges a refresh session for a new access token.
pub async fn refresh(state: &AppState, refresh_token: &str) -> Result<(User, String), AppError> {
    let user_id = state
        .sessions
        .resolve(refresh_token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".into()))?;

    let user = match state.users.find_by_id(user_id).await? {
        Some(user) => user,
        None => {
            state.sessions.revoke(refresh_token).await?;
            return Err(AppError::Unauthorized("Invalid refresh token".into()));
        }
    };
    let access_token = access_token_for(state, &user)?;
    Ok((user, access_token))
}

pub async fn logout(state: &AppState, refresh_token: Option<&str>) -> Result<(), AppError> {
    if let Some(token) = refresh_token {
        state.sessions.revoke(token).await?;
    }
    Ok(())
}

pub async fn check_duplicate_email(state: &AppState, email: &str) -> Result<(), AppError> {
    match state.users.find_by_email(email).await? {
        Some(_) => Err(AppError::DuplicateIdentity("email".into())),
        None => Ok(()),
    }
}

pub async fn check_duplicate_name(state: &AppState, username: &str) -> Result<(), AppError> {
    match state.users.find_by_username(username).await? {
        Some(_) => Err(AppError::DuplicateIdentity("username".into())),
        None => Ok(()),
    }
}

pub async fn me(state: &AppState, claims: &Claims) -> Result<UserProfile, AppError> {
    Ok(current_user(state, claims.sub).await?.profile())
}

/// Renews the caller's pending token of `kind` and resends it.
pub async fn resend_email(state: &AppState, claims: &Claims, kind: TokenKind) -> Result<(), AppError> {
    let user = current_user(state, claims.sub).await?;
    state.tokens.renew(&user.email, kind).await?;
    Ok(())
}
