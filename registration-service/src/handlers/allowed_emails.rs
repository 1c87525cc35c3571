use service_core::{
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
    },
    error::AppError,
};
use uuid::Uuid;

use crate::{
    AppState,
    dtos::ErrorResponse,
    middleware::CurrentCaller,
    models::{AdminFlag, AllowedEmail, NewAllowedEmail},
};

#[utoipa::path(
    get,
    path = "/allowed-emails",
    responses(
        (status = 200, description = "Whitelist", body = Vec<AllowedEmail>),
        (status = 403, description = "Admin only", body = ErrorResponse)
    ),
    tag = "Whitelist",
    security(("bearer_auth" = []))
)]
pub async fn list_allowed_emails(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.whitelist.list(&caller).await?))
}

/// The email is normalized before it is validated, so the body is plain JSON.
#[utoipa::path(
    post,
    path = "/allowed-emails",
    request_body = NewAllowedEmail,
    responses(
        (status = 201, description = "Email whitelisted", body = AllowedEmail),
        (status = 403, description = "Admin only", body = ErrorResponse),
        (status = 409, description = "Already whitelisted", body = ErrorResponse),
        (status = 422, description = "Invalid email", body = ErrorResponse)
    ),
    tag = "Whitelist",
    security(("bearer_auth" = []))
)]
pub async fn add_allowed_email(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Json(req): Json<NewAllowedEmail>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state.whitelist.add(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[utoipa::path(
    patch,
    path = "/allowed-emails/{id}",
    params(("id" = Uuid, Path, description = "Whitelist entry ID")),
    request_body = AdminFlag,
    responses(
        (status = 200, description = "Entry updated", body = AllowedEmail),
        (status = 404, description = "Entry not found", body = ErrorResponse),
        (status = 409, description = "Would remove the last admin", body = ErrorResponse)
    ),
    tag = "Whitelist",
    security(("bearer_auth" = []))
)]
pub async fn set_admin_flag(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Path(id): Path<Uuid>,
    Json(flag): Json<AdminFlag>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.whitelist.set_admin(&caller, id, flag.is_admin).await?))
}

#[utoipa::path(
    delete,
    path = "/allowed-emails/{id}",
    params(("id" = Uuid, Path, description = "Whitelist entry ID")),
    responses(
        (status = 204, description = "Entry removed"),
        (status = 404, description = "Entry not found", body = ErrorResponse),
        (status = 409, description = "Would remove the last admin", body = ErrorResponse)
    ),
    tag = "Whitelist",
    security(("bearer_auth" = []))
)]
pub async fn remove_allowed_email(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.whitelist.remove(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
