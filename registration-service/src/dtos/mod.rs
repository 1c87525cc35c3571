//! Documentation-only shapes of bodies produced outside the domain models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Registration is closed")]
    pub error: String,
    /// Stable machine-readable code.
    #[schema(example = "registration_closed")]
    pub code: Option<String>,
    /// First offending field, when the rejection points at input.
    pub field: Option<String>,
    pub details: Option<Vec<FieldError>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    #[schema(example = "belt_rank")]
    pub field: String,
    #[schema(example = "Invalid belt rank")]
    pub message: String,
}
