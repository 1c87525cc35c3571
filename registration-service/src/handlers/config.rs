use service_core::{
    axum::{
        Json,
        extract::{Path, State},
        response::IntoResponse,
    },
    error::AppError,
};

use crate::{
    AppState,
    dtos::ErrorResponse,
    middleware::CurrentCaller,
    models::{ConfigEntry, ConfigValue, RegistrationStatus},
};

/// Public tournament settings.
#[utoipa::path(
    get,
    path = "/config",
    responses(
        (status = 200, description = "Every setting keyed by name")
    ),
    tag = "Config"
)]
pub async fn list_config(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.settings.all().await?))
}

/// Public: whether registration is open and how long is left.
#[utoipa::path(
    get,
    path = "/config/status",
    responses(
        (status = 200, description = "Registration window", body = RegistrationStatus)
    ),
    tag = "Config"
)]
pub async fn registration_status(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.settings.status().await?))
}

#[utoipa::path(
    get,
    path = "/config/{key}",
    params(("key" = String, Path, description = "Setting name")),
    responses(
        (status = 200, description = "Setting value", body = ConfigValue),
        (status = 404, description = "Unknown key", body = ErrorResponse)
    ),
    tag = "Config"
)]
pub async fn get_config(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let value = state.settings.get(&key).await?;
    Ok(Json(ConfigValue { value }))
}

#[utoipa::path(
    put,
    path = "/config/{key}",
    params(("key" = String, Path, description = "Setting name")),
    request_body = ConfigValue,
    responses(
        (status = 200, description = "Stored setting", body = ConfigEntry),
        (status = 403, description = "Admin only", body = ErrorResponse),
        (status = 404, description = "Unknown key", body = ErrorResponse),
        (status = 422, description = "Value has the wrong shape", body = ErrorResponse)
    ),
    tag = "Config",
    security(("bearer_auth" = []))
)]
pub async fn set_config(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    Path(key): Path<String>,
    Json(body): Json<ConfigValue>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.settings.set(&caller, &key, body.value).await?))
}
