use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// A single offending input field attached to a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// A domain rejection with a stable machine-readable code.
    #[error("{message}")]
    Rejected {
        status: StatusCode,
        code: &'static str,
        message: String,
        fields: Vec<FieldIssue>,
    },

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Too many requests: {0}")]
    TooManyRequests(String, Option<u64>),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl AppError {
    pub fn rejected(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        AppError::Rejected {
            status,
            code,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    /// Attach offending fields to a rejection. Other variants are returned untouched.
    pub fn with_fields(self, issues: Vec<FieldIssue>) -> Self {
        match self {
            AppError::Rejected {
                status,
                code,
                message,
                mut fields,
            } => {
                fields.extend(issues);
                AppError::Rejected {
                    status,
                    code,
                    message,
                    fields,
                }
            }
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Rejected { status, .. } => *status,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyRequests(..) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_) | AppError::DatabaseError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: Option<&'static str>) -> Self {
        Self {
            error: error.into(),
            code,
            field: None,
            details: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (body, retry_after) = match self {
            AppError::Rejected {
                code,
                message,
                fields,
                ..
            } => {
                let mut body = ErrorResponse::new(message, Some(code));
                body.field = fields.first().map(|f| f.field.clone());
                if !fields.is_empty() {
                    body.details = serde_json::to_value(&fields).ok();
                }
                (body, None)
            }
            AppError::TooManyRequests(msg, retry) => {
                (ErrorResponse::new(msg, Some("too_many_requests")), retry)
            }
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal error");
                (
                    ErrorResponse::new("Internal server error", Some("internal")),
                    None,
                )
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                (ErrorResponse::new("Database error", Some("store")), None)
            }
            AppError::ConfigError(err) => {
                let mut body = ErrorResponse::new("Configuration error", Some("config"));
                body.details = Some(serde_json::Value::String(err.to_string()));
                (body, None)
            }
            AppError::ServiceUnavailable => (
                ErrorResponse::new("Service unavailable", Some("unavailable")),
                None,
            ),
            AppError::BadRequest(err) => {
                (ErrorResponse::new(err.to_string(), Some("bad_request")), None)
            }
            AppError::NotFound(err) => {
                (ErrorResponse::new(err.to_string(), Some("not_found")), None)
            }
            AppError::Unauthorized(err) => {
                (ErrorResponse::new(err.to_string(), Some("unauthorized")), None)
            }
            AppError::Forbidden(err) => {
                (ErrorResponse::new(err.to_string(), Some("forbidden")), None)
            }
            AppError::Conflict(err) => {
                (ErrorResponse::new(err.to_string(), Some("conflict")), None)
            }
        };

        let mut res = (status, Json(body)).into_response();

        if let Some(retry) = retry_after {
            res.headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        res
    }
}
