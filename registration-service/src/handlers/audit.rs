use service_core::{
    axum::{
        Json,
        extract::{Query, State, rejection::QueryRejection},
        response::IntoResponse,
    },
    error::AppError,
};

use crate::{
    AppState,
    dtos::ErrorResponse,
    handlers::bad_query,
    middleware::CurrentCaller,
    models::{AuditFilter, AuditLogEntry, AuditSummary, ChainVerification},
};

#[utoipa::path(
    get,
    path = "/audit-logs",
    params(AuditFilter),
    responses(
        (status = 200, description = "Newest entries first", body = Vec<AuditLogEntry>),
        (status = 400, description = "Malformed filter", body = ErrorResponse),
        (status = 403, description = "Admin only", body = ErrorResponse)
    ),
    tag = "Audit",
    security(("bearer_auth" = []))
)]
pub async fn list_audit_logs(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
    filter: Result<Query<AuditFilter>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(filter) = filter.map_err(bad_query)?;
    Ok(Json(state.audit.read(&caller, &filter).await?))
}

#[utoipa::path(
    get,
    path = "/audit-logs/summary",
    responses(
        (status = 200, description = "Entry counts by action and dojo", body = AuditSummary),
        (status = 403, description = "Admin only", body = ErrorResponse)
    ),
    tag = "Audit",
    security(("bearer_auth" = []))
)]
pub async fn audit_summary(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.audit.summary(&caller).await?))
}

#[utoipa::path(
    get,
    path = "/audit-logs/verify",
    responses(
        (status = 200, description = "Result of walking the hash chain", body = ChainVerification),
        (status = 403, description = "Admin only", body = ErrorResponse)
    ),
    tag = "Audit",
    security(("bearer_auth" = []))
)]
pub async fn verify_audit_chain(
    State(state): State<AppState>,
    CurrentCaller(caller): CurrentCaller,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.audit.verify_chain(&caller).await?))
}
