use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::utils::validation::{validate_person_name, validate_phone};

/// Profile of an authenticated user. `id` is the identity provider's user id.
///
/// `is_admin` is copied from the whitelist at onboarding for display. Authorization
/// never reads it.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Coach {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub dojo_id: Uuid,
    pub is_admin: bool,
    pub onboarding_complete: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct OnboardingRequest {
    #[validate(custom(function = "validate_person_name"))]
    #[schema(example = "Jane Doe")]
    pub full_name: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    pub dojo_id: Uuid,
}

/// Self-service profile edit. An empty `phone` clears it.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CoachPatch {
    #[validate(custom(function = "validate_person_name"))]
    pub full_name: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    pub dojo_id: Option<Uuid>,
}
