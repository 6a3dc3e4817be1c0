pub mod extractors;
pub mod middleware;
pub mod password;
pub mod token;

use std::borrow::Cow;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::UserProfile;
use crate::tokens::TokenKind;

pub use extractors::AuthenticatedUser;
pub use middleware::AuthMiddleware;
pub use password::{hash_password, verify_password};
pub use token::{generate_access_token, verify_access_token, Claims};

/// Cookie carrying the access token for browser clients.
pub const ACCESS_COOKIE: &str = "accessToken";
/// HttpOnly cookie carrying the refresh session token.
pub const REFRESH_COOKIE: &str = "refreshToken";
/// Cookie carrying a checked reset-password token between the landing page
/// and the password change.
pub const RESET_PASSWORD_COOKIE: &str = "resetPasswordToken";

/// Phrase a user must type to delete their account.
pub const DELETE_CONFIRMATION: &str = "Delete account";

const PROHIBITED_NAME_WORDS: &[&str] = &["admin", "webmaster"];

lazy_static! {
    // Usernames are plain ASCII letters and digits
    static ref USERNAME_REGEX: regex::Regex = regex::Regex::new(r"^[A-Za-z0-9]+$").unwrap();
}

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Rejects names built around reserved words, ignoring digits and case.
fn validate_allowed_name(name: &str) -> Result<(), ValidationError> {
    let letters: String = name
        .chars()
        .filter(|c| !c.is_ascii_digit() && !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if PROHIBITED_NAME_WORDS.iter().any(|word| letters.contains(word)) {
        return Err(validation_error(
            "prohibited_name",
            "Name contains prohibited words",
        ));
    }
    Ok(())
}

fn validate_register_request(request: &RegisterRequest) -> Result<(), ValidationError> {
    let email = request.email.as_str();
    if !email.is_empty() && request.password.contains(email) {
        return Err(validation_error(
            "email_in_password",
            "The email string is included in the password.",
        ));
    }
    let username = request.username.as_str();
    if !username.is_empty() && request.password.contains(username) {
        return Err(validation_error(
            "name_in_password",
            "The name string is included in the password.",
        ));
    }
    Ok(())
}

fn validate_delete_confirmation(value: &str) -> Result<(), ValidationError> {
    if value.trim() != DELETE_CONFIRMATION {
        return Err(validation_error("confirmation", "Wrong input value"));
    }
    Ok(())
}

/// Represents the payload for a user login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 32))]
    pub password: String,
}

/// Trims surrounding whitespace in place, keeping the buffer when nothing
/// changes.
fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

impl LoginRequest {
    /// Strips whitespace around the email so validation and lookup see the
    /// address a user meant.
    pub fn normalized(mut self) -> Self {
        trim_in_place(&mut self.email);
        self
    }
}

/// Represents the payload for a new user registration request.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_register_request", skip_on_field_errors = false))]
pub struct RegisterRequest {
    #[validate(email, length(max = 320))]
    pub email: String,
    /// 3 to 39 letters or digits, free of reserved words.
    #[validate(
        length(min = 3, max = 39),
        regex(path = "USERNAME_REGEX", message = "Username must be alphanumeric"),
        custom = "validate_allowed_name"
    )]
    pub username: String,
    #[validate(length(min = 8, max = 32))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Password does not match."))]
    pub confirm_password: String,
}

impl RegisterRequest {
    pub fn normalized(mut self) -> Self {
        trim_in_place(&mut self.email);
        trim_in_place(&mut self.username);
        self
    }
}

/// An email address; used for availability checks and email-keyed commands.
#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email, length(max = 320))]
    pub email: String,
}

impl EmailRequest {
    pub fn normalized(mut self) -> Self {
        trim_in_place(&mut self.email);
        self
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UsernameRequest {
    #[validate(
        length(min = 3, max = 39),
        regex(path = "USERNAME_REGEX", message = "Username must be alphanumeric")
    )]
    pub username: String,
}

impl UsernameRequest {
    pub fn normalized(mut self) -> Self {
        trim_in_place(&mut self.username);
        self
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNameRequest {
    #[validate(
        length(min = 3, max = 39),
        regex(path = "USERNAME_REGEX", message = "Username must be alphanumeric"),
        custom = "validate_allowed_name"
    )]
    pub new_name: String,
}

impl ChangeNameRequest {
    pub fn normalized(mut self) -> Self {
        trim_in_place(&mut self.new_name);
        self
    }
}

/// New password for a reset. The token comes from the reset cookie unless
/// given in the body.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub token: Option<String>,
    #[validate(length(min = 8, max = 32))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Password does not match."))]
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeleteAccountRequest {
    #[validate(custom = "validate_delete_confirmation")]
    pub validation: String,
}

/// Which pending token to renew; a signup token when omitted.
#[derive(Debug, Default, Deserialize)]
pub struct ResendEmailRequest {
    pub event: Option<TokenKind>,
}

/// `?token=` of the verification links.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

/// Response after login, refresh, email change and rename.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserProfile,
}
