use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// A whitelisted email. Membership admits a caller; `is_admin` grants the admin role.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct AllowedEmail {
    pub id: Uuid,
    pub email: String,
    pub is_admin: bool,
    pub added_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewAllowedEmail {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "coach@dojo.example")]
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AdminFlag {
    pub is_admin: bool,
}
