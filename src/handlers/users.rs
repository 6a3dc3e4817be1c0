use validator::Validate;

use super::{access_token_for, current_user};
use crate::auth::{
    hash_password, ChangeNameRequest, ChangePasswordRequest, Claims, DeleteAccountRequest,
    EmailRequest,
};
use crate::error::AppError;
use crate::models::User;
use crate::state::AppState;
use crate::tokens::{TokenKind, Transition};

pub async fn verify_signup_token(state: &AppState, token: &str) -> Result<User, AppError> {
    state.tokens.consume(token, Transition::ConfirmSignup).await
}

pub async fn send_reset_password_email(state: &AppState, request: EmailRequest) -> Result<(), AppError> {
    let request = request.normalized();
    request.validate()?;
    state
        .tokens
        .issue(&request.email, TokenKind::ResetPassword, None)
        .await?;
    Ok(())
}

/// Checks a reset-password link without consuming it.
pub async fn check_reset_password_token(state: &AppState, token: &str) -> Result<User, AppError> {
    state.tokens.check(TokenKind::ResetPassword, token).await
}

pub async fn change_password(
    state: &AppState,
    token: &str,
    request: ChangePasswordRequest,
) -> Result<User, AppError> {
    request.validate()?;
    let password_hash = hash_password(&request.password, state.auth.bcrypt_cost)?;
    state
        .tokens
        .consume(token, Transition::ResetPassword { password_hash })
        .await
}

pub async fn send_change_email_token(
    state: &AppState,
    claims: &Claims,
    request: EmailRequest,
) -> Result<(), AppError> {
    let request = request.normalized();
    request.validate()?;
    let user = current_user(state, claims.sub).await?;
    state
        .tokens
        .issue(&user.email, TokenKind::ChangeEmail, Some(&request.email))
        .await?;
    Ok(())
}

/// Applies a pending email change. The returned access token carries the
/// new address.
pub async fn verify_change_email_token(
    state: &AppState,
    token: &str,
) -> Result<(User, String), AppError> {
    let user = state
        .tokens
        .consume(token, Transition::ConfirmEmailChange)
        .await?;
    let access_token = access_token_for(state, &user)?;
    Ok((user, access_token))
}

pub async fn change_name(
    state: &AppState,
    claims: &Claims,
    request: ChangeNameRequest,
) -> Result<(User, String), AppError> {
    let request = request.normalized();
    request.validate()?;
    let new_name = request.new_name.as_str();

    if let Some(owner) = state.users.find_by_username(new_name).await? {
        if owner.id != claims.sub {
            return Err(AppError::DuplicateIdentity("username".into()));
        }
    }
    let user = state
        .users
        .update_username(claims.sub, new_name)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let access_token = access_token_for(state, &user)?;
    Ok((user, access_token))
}

pub async fn delete_account(
    state: &AppState,
    claims: &Claims,
    request: DeleteAccountRequest,
) -> Result<(), AppError> {
    request.validate()?;
    let user = current_user(state, claims.sub).await?;

    if state.users.delete_user(user.id).await? == 0 {
        return Err(AppError::InternalServerError("Cannot delete user".into()));
    }
    state.tokens.discard_pending(&user).await;
    log::info!("user {} deleted their account", user.id);
    Ok(())
}
