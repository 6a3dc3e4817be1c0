pub mod auth;
pub mod health;
pub mod routines;
pub mod timers;
pub mod users;

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::web;

use crate::auth::{ACCESS_COOKIE, REFRESH_COOKIE, RESET_PASSWORD_COOKIE};
use crate::state::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health).service(
        web::scope("/api")
            .service(
                web::scope("/auth")
                    .service(auth::register)
                    .service(auth::login)
                    .service(auth::refresh)
                    .service(auth::check_duplicate_email)
                    .service(auth::check_duplicate_name)
                    .service(auth::me)
                    .service(auth::logout)
                    .service(auth::resend_email),
            )
            .service(
                web::scope("/users")
                    .service(users::verify_signup_token)
                    .service(users::send_reset_password_email)
                    .service(users::verify_reset_password_token)
                    .service(users::change_password)
                    .service(users::send_change_email_token)
                    .service(users::verify_change_email_token)
                    .service(users::change_name)
                    .service(users::delete_account),
            )
            .service(
                web::scope("/timers")
                    .service(timers::list_timers)
                    .service(timers::save_timers),
            )
            .service(
                web::scope("/routines")
                    .service(routines::list_routines)
                    .service(routines::save_routine)
                    .service(routines::delete_routine),
            ),
    );
}

fn cookie(name: &'static str, value: String, path: &'static str, secure: bool, max_age: i64) -> Cookie<'static> {
    Cookie::build(name, value)
        .path(path)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(max_age))
        .finish()
}

pub(crate) fn access_cookie(state: &AppState, token: String) -> Cookie<'static> {
    cookie(
        ACCESS_COOKIE,
        token,
        "/",
        state.auth.cookie_secure,
        state.auth.access_lifetime.num_seconds(),
    )
}

pub(crate) fn refresh_cookie(state: &AppState, token: String) -> Cookie<'static> {
    cookie(
        REFRESH_COOKIE,
        token,
        "/api/auth",
        state.auth.cookie_secure,
        state.auth.refresh_lifetime.num_seconds(),
    )
}

pub(crate) fn reset_password_cookie(state: &AppState, token: String) -> Cookie<'static> {
    cookie(
        RESET_PASSWORD_COOKIE,
        token,
        "/api/users",
        state.auth.cookie_secure,
        state.tokens.lifetime().num_seconds(),
    )
}

/// A cookie that makes the client drop `name` at `path`.
pub(crate) fn removal_cookie(name: &'static str, path: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build(name, "").path(path).finish();
    cookie.make_removal();
    cookie
}
