use crate::{
    auth::AuthenticatedUser, error::AppError, handlers, models::SaveTimersRequest, state::AppState,
};
use actix_web::{get, put, web, HttpResponse, Responder};

/// Lists the caller's timers by ascending `order`.
#[get("")]
pub async fn list_timers(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let timers = handlers::timers::list_timers(&state, user.0.sub).await?;
    Ok(HttpResponse::Ok().json(timers))
}

/// Replaces the caller's timer inventory with the request body.
///
/// Timers missing from the body are deleted and removed from routines.
#[put("")]
pub async fn save_timers(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<SaveTimersRequest>,
) -> Result<impl Responder, AppError> {
    let timers = handlers::timers::save_timers(&state, user.0.sub, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(timers))
}
