use axum::http::StatusCode;
use chrono::NaiveDate;
use service_core::error::{AppError, FieldIssue};
use thiserror::Error;

pub const ATHLETE_UNIQUE: &str = "athletes_name_dob_dojo_key";
pub const DOJO_UNIQUE: &str = "dojos_name_key";
pub const ALLOWED_EMAIL_UNIQUE: &str = "allowed_emails_email_key";
pub const COACH_EMAIL_UNIQUE: &str = "coaches_email_key";

/// Failures reported by a storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint {constraint} violated")]
    UniqueViolation { constraint: String },

    #[error("foreign key constraint {constraint} blocks the change")]
    ForeignKeyViolation { constraint: String },

    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                }
            }
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                StoreError::ForeignKeyViolation {
                    constraint: db_err.constraint().unwrap_or_default().to_string(),
                }
            }
            other => StoreError::Backend(anyhow::Error::new(other)),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::Backend(anyhow::anyhow!("Migration failed: {}", err))
    }
}

/// Domain errors of the registration core.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("{0} is not on the access list")]
    NotWhitelisted(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Athlete '{full_name}' born {date_of_birth} is already registered for this dojo")]
    DuplicateAthlete {
        full_name: String,
        date_of_birth: NaiveDate,
    },

    #[error("A dojo named '{0}' already exists")]
    DuplicateDojo(String),

    #[error("{0} is already on the access list")]
    DuplicateEmail(String),

    #[error("Registration is closed")]
    RegistrationClosed,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invalid input")]
    ValidationError(Vec<FieldIssue>),

    #[error("{0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RegistrationError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        RegistrationError::Forbidden(msg.into())
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        RegistrationError::ValidationError(vec![FieldIssue::new(field, message)])
    }

    /// Stable machine-readable code, also used as the `code` of the HTTP error body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotWhitelisted(_) => "not_whitelisted",
            Self::Forbidden(_) => "forbidden",
            Self::DuplicateAthlete { .. } => "duplicate_athlete",
            Self::DuplicateDojo(_) => "duplicate_dojo",
            Self::DuplicateEmail(_) => "duplicate_email",
            Self::RegistrationClosed => "registration_closed",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::Conflict(_) => "conflict",
            Self::Store(_) => "store",
            Self::Internal(_) => "internal",
        }
    }

    /// Offending fields, for rejections that point at specific input.
    pub fn field_issues(&self) -> Vec<FieldIssue> {
        match self {
            Self::ValidationError(issues) => issues.clone(),
            Self::DuplicateAthlete {
                full_name,
                date_of_birth,
            } => vec![
                FieldIssue::new(
                    "full_name",
                    format!("'{}' is already registered for this dojo", full_name),
                ),
                FieldIssue::new(
                    "date_of_birth",
                    format!("{} matches the registered athlete", date_of_birth),
                ),
            ],
            _ => Vec::new(),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::NotWhitelisted(_) | Self::Forbidden(_) | Self::RegistrationClosed => {
                StatusCode::FORBIDDEN
            }
            Self::DuplicateAthlete { .. }
            | Self::DuplicateDojo(_)
            | Self::DuplicateEmail(_)
            | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Untranslated store failures. Callers that expect a specific constraint map it first.
impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ForeignKeyViolation { .. } => RegistrationError::Conflict(
                "The record is still referenced by other records".to_string(),
            ),
            other => RegistrationError::Store(other),
        }
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        let status = err.status();
        let code = err.kind();
        match err {
            RegistrationError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            RegistrationError::Internal(e) => AppError::InternalError(e),
            RegistrationError::ValidationError(fields) => {
                AppError::rejected(status, code, "Validation failed").with_fields(fields)
            }
            duplicate @ RegistrationError::DuplicateAthlete { .. } => {
                let fields = duplicate.field_issues();
                AppError::rejected(status, code, duplicate.to_string()).with_fields(fields)
            }
            other => AppError::rejected(status, code, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn duplicate() -> RegistrationError {
        RegistrationError::DuplicateAthlete {
            full_name: "A. Lee".into(),
            date_of_birth: NaiveDate::from_ymd_opt(2010, 5, 1).unwrap(),
        }
    }

    #[test]
    fn duplicate_athlete_names_the_athlete() {
        let err = duplicate();
        assert_eq!(
            err.to_string(),
            "Athlete 'A. Lee' born 2010-05-01 is already registered for this dojo"
        );
        let fields: Vec<_> = err.field_issues().into_iter().map(|f| f.field).collect();
        assert_eq!(fields, ["full_name", "date_of_birth"]);
    }

    #[test]
    fn foreign_key_block_is_a_conflict() {
        let err: RegistrationError = StoreError::ForeignKeyViolation {
            constraint: "athletes_dojo_id_fkey".into(),
        }
        .into();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn maps_to_http_status() {
        let cases = [
            (RegistrationError::NotWhitelisted("a@x.com".into()), 403),
            (RegistrationError::forbidden("no"), 403),
            (RegistrationError::RegistrationClosed, 403),
            (duplicate(), 409),
            (RegistrationError::DuplicateDojo("Tigers".into()), 409),
            (RegistrationError::DuplicateEmail("a@x.com".into()), 409),
            (RegistrationError::Conflict("last admin".into()), 409),
            (RegistrationError::NotFound("Athlete"), 404),
            (RegistrationError::invalid("gender", "bad"), 422),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status().as_u16(), status);
        }
        let store = AppError::from(RegistrationError::Store(StoreError::Backend(
            anyhow::anyhow!("connection reset"),
        )));
        assert_eq!(store.status().as_u16(), 500);
    }
}
