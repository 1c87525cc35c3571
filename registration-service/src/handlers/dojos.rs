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
    models::{Dojo, DojoName},
    utils::ValidatedJson,
};

/// Public: populates the onboarding dropdown.
#[utoipa::path(
    get,
    path = "/dojos",
    responses((status = 200, description = "Dojos by name", body = Vec<Dojo>)),
    tag = "Dojos"
)]
pub async fn list_dojos(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.dojos.list().await?))
}

#[utoipa::path(
    post,
    path = "/dojos",
    request_body = DojoName,
    responses(
        (status = 201, description = "Dojo created", body = Dojo),
        (status = 409, description = "Name taken", body = ErrorResponse),
        (status = 422, description = "Invalid name", body = ErrorResponse)
    ),
    tag = "Dojos",
    security(("bearer_auth" = []))
)]
pub async fn create_dojo(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    ValidatedJson(req): ValidatedJson<DojoName>,
) -> Result<impl IntoResponse, AppError> {
    let dojo = state.dojos.create(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(dojo)))
}

#[utoipa::path(
    patch,
    path = "/dojos/{id}",
    params(("id" = Uuid, Path, description = "Dojo ID")),
    request_body = DojoName,
    responses(
        (status = 200, description = "Dojo renamed", body = Dojo),
        (status = 403, description = "Admin only", body = ErrorResponse),
        (status = 404, description = "Dojo not found", body = ErrorResponse),
        (status = 409, description = "Name taken", body = ErrorResponse)
    ),
    tag = "Dojos",
    security(("bearer_auth" = []))
)]
pub async fn rename_dojo(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<DojoName>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.dojos.rename(&caller, id, req).await?))
}

#[utoipa::path(
    delete,
    path = "/dojos/{id}",
    params(("id" = Uuid, Path, description = "Dojo ID")),
    responses(
        (status = 204, description = "Dojo removed"),
        (status = 403, description = "Admin only", body = ErrorResponse),
        (status = 404, description = "Dojo not found", body = ErrorResponse),
        (status = 409, description = "Dojo still has coaches or athletes", body = ErrorResponse)
    ),
    tag = "Dojos",
    security(("bearer_auth" = []))
)]
pub async fn delete_dojo(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.dojos.remove(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
