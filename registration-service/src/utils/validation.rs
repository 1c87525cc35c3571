use axum::{
    Json,
    extract::{FromRequest, Request},
    http::StatusCode,
};
use chrono::{NaiveDate, Utc};
use serde::de::DeserializeOwned;
use service_core::error::{AppError, FieldIssue};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{AthleteInput, BeltRank, CompetitionDay, Gender};

/// JSON body that has passed its `Validate` rules.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            AppError::rejected(
                StatusCode::BAD_REQUEST,
                "bad_request",
                format!("Json parse error: {}", e.body_text()),
            )
        })?;

        value.validate().map_err(|e| {
            AppError::rejected(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Validation failed",
            )
            .with_fields(field_issues(&e))
        })?;

        Ok(ValidatedJson(value))
    }
}

/// Flatten validator output into `(field, message)` pairs, sorted by field.
///
/// Struct-level failures are reported under the code of the failing rule.
pub fn field_issues(errors: &ValidationErrors) -> Vec<FieldIssue> {
    let mut issues: Vec<FieldIssue> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |err| {
                let name = if field == "__all__" {
                    err.code.to_string()
                } else {
                    field.clone()
                };
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid {}", name));
                FieldIssue::new(name, message)
            })
        })
        .collect();

    issues.sort_by(|a, b| a.field.cmp(&b.field));
    issues
}

fn invalid(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

pub fn validate_person_name(name: &str) -> Result<(), ValidationError> {
    let len = name.trim().chars().count();
    if len == 0 {
        return Err(invalid("required", "Name is required"));
    }
    if len < 2 {
        return Err(invalid("length", "Name must be at least 2 characters"));
    }
    if len > 100 {
        return Err(invalid("length", "Name must be less than 100 characters"));
    }
    Ok(())
}

pub fn parse_date_of_birth(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

pub fn validate_date_of_birth(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(invalid("required", "Date of birth is required"));
    }
    let dob = parse_date_of_birth(value)
        .ok_or_else(|| invalid("format", "Invalid date format (use YYYY-MM-DD)"))?;

    let today = Utc::now().date_naive();
    if dob >= today {
        return Err(invalid("range", "Date of birth must be in the past"));
    }

    let age_years = (today - dob).num_days() as f64 / 365.25;
    if age_years < 3.0 {
        return Err(invalid("range", "Athlete must be at least 3 years old"));
    }
    if age_years > 100.0 {
        return Err(invalid("range", "Invalid date of birth"));
    }
    Ok(())
}

pub fn validate_gender(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(invalid("required", "Gender is required"));
    }
    Gender::parse(value)
        .map(|_| ())
        .ok_or_else(|| invalid("choice", "Gender must be one of: Male, Female"))
}

pub fn validate_belt_rank(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(invalid("required", "Belt rank is required"));
    }
    BeltRank::parse(value)
        .map(|_| ())
        .ok_or_else(|| invalid("choice", "Invalid belt rank"))
}

pub fn validate_competition_day(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(invalid("required", "Competition day is required"));
    }
    CompetitionDay::parse(value)
        .map(|_| ())
        .ok_or_else(|| invalid("choice", "Competition day must be one of: Day 1, Day 2, Both"))
}

pub fn validate_events(input: &AthleteInput) -> Result<(), ValidationError> {
    if !input.kata_event && !input.kumite_event {
        return Err(invalid(
            "events",
            "At least one event (Kata or Kumite) must be selected",
        ));
    }
    Ok(())
}

/// Strip the separators people type into phone numbers.
pub fn clean_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '-' | '(' | ')' | '.'))
        .collect()
}

/// Optional leading `+` followed by 7 to 15 digits, once separators are removed.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if phone.trim().is_empty() {
        return Ok(());
    }
    let cleaned = clean_phone(phone);
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    let ok = (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(invalid("format", "Invalid phone number format"))
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Capitalise the first letter of every alphabetic run and lowercase the rest.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_alpha = false;
    for c in value.trim().chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn input() -> AthleteInput {
        AthleteInput {
            full_name: "A. Lee".into(),
            date_of_birth: "2010-05-01".into(),
            gender: "Female".into(),
            belt_rank: "Green".into(),
            weight_kg: Some(42.5),
            competition_day: "Day 1".into(),
            kata_event: true,
            kumite_event: false,
        }
    }

    #[test]
    fn accepts_a_complete_athlete() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn reports_every_failing_field() {
        let bad = AthleteInput {
            full_name: " x ".into(),
            gender: "Other".into(),
            belt_rank: "Black 6th Dan".into(),
            weight_kg: Some(250.0),
            competition_day: "Day 3".into(),
            kata_event: false,
            kumite_event: false,
            ..input()
        };

        let issues = field_issues(&bad.validate().unwrap_err());
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "belt_rank",
                "competition_day",
                "events",
                "full_name",
                "gender",
                "weight_kg"
            ]
        );
    }

    #[test]
    fn date_of_birth_rules() {
        assert!(validate_date_of_birth("01/05/2010").is_err());
        let today = Utc::now().date_naive();
        assert!(validate_date_of_birth(&today.format("%Y-%m-%d").to_string()).is_err());
        let toddler = today - Duration::days(365);
        assert!(validate_date_of_birth(&toddler.format("%Y-%m-%d").to_string()).is_err());
        assert!(validate_date_of_birth("1900-01-01").is_err());
        assert!(validate_date_of_birth("1990-06-15").is_ok());
    }

    #[test]
    fn phone_rules() {
        assert!(validate_phone("").is_ok());
        assert!(validate_phone("+1 (555) 123-4567").is_ok());
        assert!(validate_phone("555.1234").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("+1 555 CALL NOW").is_err());
        assert_eq!(clean_phone("+1 (555) 123-4567"), "+15551234567");
    }

    #[test]
    fn title_case_matches_display_names() {
        assert_eq!(title_case("  a. lee "), "A. Lee");
        assert_eq!(title_case("MARY-JANE o'neil"), "Mary-Jane O'Neil");
    }

    #[test]
    fn normalizes_email() {
        assert_eq!(normalize_email("  Coach@X.com "), "coach@x.com");
    }
}
