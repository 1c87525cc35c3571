//! HTTP handlers for registration-service.

pub mod allowed_emails;
pub mod athletes;
pub mod audit;
pub mod coaches;
pub mod config;
pub mod dojos;
pub mod health;
pub mod session;

use service_core::{
    axum::{extract::rejection::QueryRejection, http::StatusCode},
    error::AppError,
};

pub(crate) fn bad_query(rejection: QueryRejection) -> AppError {
    AppError::rejected(
        StatusCode::BAD_REQUEST,
        "bad_request",
        rejection.body_text(),
    )
}
