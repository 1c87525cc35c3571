use service_core::{
    axum::{Json, extract::State, response::IntoResponse},
    error::AppError,
};

use crate::{AppState, dtos::ErrorResponse, middleware::AuthUser, services::SessionInfo};

/// Called by the client right after the identity provider signs the user in.
///
/// A 403 `not_whitelisted` here means the sign-in must not complete.
#[utoipa::path(
    post,
    path = "/session",
    responses(
        (status = 200, description = "Admission and onboarding state", body = SessionInfo),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Not whitelisted", body = ErrorResponse)
    ),
    tag = "Session",
    security(("bearer_auth" = []))
)]
pub async fn sign_in(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let session = state.sessions.sign_in(&identity).await?;
    Ok(Json(session))
}
