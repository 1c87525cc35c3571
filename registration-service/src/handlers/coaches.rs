use service_core::{
    axum::{Json, extract::State, http::StatusCode, response::IntoResponse},
    error::AppError,
};

use crate::{
    AppState,
    dtos::ErrorResponse,
    middleware::{AuthUser, CurrentCaller},
    models::{Coach, CoachPatch, OnboardingRequest},
};

/// Finish onboarding. Admission is checked before the body is looked at.
#[utoipa::path(
    post,
    path = "/coaches/me",
    request_body = OnboardingRequest,
    responses(
        (status = 201, description = "Profile created", body = Coach),
        (status = 403, description = "Not whitelisted", body = ErrorResponse),
        (status = 404, description = "Dojo not found", body = ErrorResponse),
        (status = 409, description = "Already onboarded", body = ErrorResponse)
    ),
    tag = "Coaches",
    security(("bearer_auth" = []))
)]
pub async fn complete_onboarding(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Json(req): Json<OnboardingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let coach = state.coaches.complete_onboarding(&identity, req).await?;
    Ok((StatusCode::CREATED, Json(coach)))
}

#[utoipa::path(
    get,
    path = "/coaches/me",
    responses(
        (status = 200, description = "Own profile", body = Coach),
        (status = 404, description = "Onboarding not completed", body = ErrorResponse)
    ),
    tag = "Coaches",
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.coaches.me(&caller).await?))
}

#[utoipa::path(
    patch,
    path = "/coaches/me",
    request_body = CoachPatch,
    responses(
        (status = 200, description = "Updated profile", body = Coach),
        (status = 422, description = "Invalid fields", body = ErrorResponse)
    ),
    tag = "Coaches",
    security(("bearer_auth" = []))
)]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Json(patch): Json<CoachPatch>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.coaches.update_me(&caller, patch).await?))
}

#[utoipa::path(
    get,
    path = "/coaches",
    responses(
        (status = 200, description = "Every coach profile", body = Vec<Coach>),
        (status = 403, description = "Admin only", body = ErrorResponse)
    ),
    tag = "Coaches",
    security(("bearer_auth" = []))
)]
pub async fn list_coaches(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.coaches.list(&caller).await?))
}
