use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    handlers::{self, SuccessResponse},
    models::SaveRoutineRequest,
    state::AppState,
};
use actix_web::{delete, get, put, web, HttpResponse, Responder};

#[get("")]
pub async fn list_routines(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let routines = handlers::routines::list_routines(&state, user.0.sub).await?;
    Ok(HttpResponse::Ok().json(routines))
}

/// Creates or replaces a routine. `data` lists the routine's timers in order.
#[put("")]
pub async fn save_routine(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<SaveRoutineRequest>,
) -> Result<impl Responder, AppError> {
    let routine = handlers::routines::save_routine(&state, user.0.sub, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(routine))
}

#[delete("/{id}")]
pub async fn delete_routine(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    routine_id: web::Path<String>,
) -> Result<impl Responder, AppError> {
    handlers::routines::delete_routine(&state, user.0.sub, &routine_id).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::ok()))
}
