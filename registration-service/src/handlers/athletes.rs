//! Athlete roster endpoints.
//!
//! Bodies are taken as plain JSON: the registry validates after admission,
//! onboarding and access checks, and a bulk upload reports bad rows instead of
//! failing the request.

use serde::Deserialize;
use service_core::{
    axum::{
        Json,
        extract::{Path, Query, State, rejection::QueryRejection},
        http::StatusCode,
        response::IntoResponse,
    },
    error::AppError,
};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    AppState,
    dtos::ErrorResponse,
    handlers::bad_query,
    middleware::CurrentCaller,
    models::{Athlete, AthleteFilter, AthleteInput, AthletePatch, AthleteStats},
    services::BulkOutcome,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkRegisterRequest {
    pub athletes: Vec<AthleteInput>,
}

#[utoipa::path(
    get,
    path = "/athletes",
    params(AthleteFilter),
    responses(
        (status = 200, description = "Athletes visible to the caller", body = Vec<Athlete>),
        (status = 400, description = "Malformed filter", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Not whitelisted", body = ErrorResponse)
    ),
    tag = "Athletes",
    security(("bearer_auth" = []))
)]
pub async fn list_athletes(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    filter: Result<Query<AthleteFilter>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(filter) = filter.map_err(bad_query)?;
    Ok(Json(state.athletes.list(&caller, &filter).await?))
}

#[utoipa::path(
    post,
    path = "/athletes",
    request_body = AthleteInput,
    responses(
        (status = 201, description = "Athlete registered", body = Athlete),
        (status = 403, description = "Registration closed or onboarding incomplete", body = ErrorResponse),
        (status = 409, description = "Athlete already registered for this dojo", body = ErrorResponse),
        (status = 422, description = "Invalid fields", body = ErrorResponse)
    ),
    tag = "Athletes",
    security(("bearer_auth" = []))
)]
pub async fn register_athlete(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Json(input): Json<AthleteInput>,
) -> Result<impl IntoResponse, AppError> {
    let athlete = state.athletes.register(&caller, input).await?;
    Ok((StatusCode::CREATED, Json(athlete)))
}

/// 200 with `{succeeded, rejected}`, even when some rows were rejected.
#[utoipa::path(
    post,
    path = "/athletes/bulk",
    request_body = BulkRegisterRequest,
    responses(
        (status = 200, description = "Per-row outcome of the upload", body = BulkOutcome),
        (status = 403, description = "Registration closed or onboarding incomplete", body = ErrorResponse),
        (status = 422, description = "Empty or oversized batch", body = ErrorResponse)
    ),
    tag = "Athletes",
    security(("bearer_auth" = []))
)]
pub async fn bulk_register(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Json(req): Json<BulkRegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.athletes.bulk_register(&caller, req.athletes).await?))
}

#[utoipa::path(
    get,
    path = "/athletes/stats",
    responses(
        (status = 200, description = "Counts over the caller's roster", body = AthleteStats),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "Athletes",
    security(("bearer_auth" = []))
)]
pub async fn athlete_stats(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.athletes.stats(&caller).await?))
}

#[utoipa::path(
    get,
    path = "/athletes/{id}",
    params(("id" = Uuid, Path, description = "Athlete ID")),
    responses(
        (status = 200, description = "Athlete", body = Athlete),
        (status = 403, description = "Athlete belongs to another coach", body = ErrorResponse),
        (status = 404, description = "Athlete not found", body = ErrorResponse)
    ),
    tag = "Athletes",
    security(("bearer_auth" = []))
)]
pub async fn get_athlete(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.athletes.get(&caller, id).await?))
}

#[utoipa::path(
    patch,
    path = "/athletes/{id}",
    params(("id" = Uuid, Path, description = "Athlete ID")),
    request_body = AthletePatch,
    responses(
        (status = 200, description = "Updated athlete", body = Athlete),
        (status = 403, description = "Forbidden or registration closed", body = ErrorResponse),
        (status = 404, description = "Athlete not found", body = ErrorResponse),
        (status = 409, description = "Change collides with a registered athlete", body = ErrorResponse),
        (status = 422, description = "Invalid fields", body = ErrorResponse)
    ),
    tag = "Athletes",
    security(("bearer_auth" = []))
)]
pub async fn update_athlete(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Path(id): Path<Uuid>,
    Json(patch): Json<AthletePatch>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.athletes.update(&caller, id, patch).await?))
}

#[utoipa::path(
    delete,
    path = "/athletes/{id}",
    params(("id" = Uuid, Path, description = "Athlete ID")),
    responses(
        (status = 204, description = "Athlete removed"),
        (status = 403, description = "Forbidden or registration closed", body = ErrorResponse),
        (status = 404, description = "Athlete not found", body = ErrorResponse)
    ),
    tag = "Athletes",
    security(("bearer_auth" = []))
)]
pub async fn delete_athlete(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.athletes.delete(&caller, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
