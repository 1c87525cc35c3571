use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// A global tournament setting.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct ConfigEntry {
    pub key: String,
    #[schema(value_type = Object)]
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
    /// Identity id of the admin who last wrote the value. `None` for seeded rows.
    pub updated_by: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    TournamentName,
    TournamentDates,
    RegistrationOpen,
    RegistrationDeadline,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 4] = [
        ConfigKey::TournamentName,
        ConfigKey::TournamentDates,
        ConfigKey::RegistrationOpen,
        ConfigKey::RegistrationDeadline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TournamentName => "tournament_name",
            Self::TournamentDates => "tournament_dates",
            Self::RegistrationOpen => "registration_open",
            Self::RegistrationDeadline => "registration_deadline",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }
}

impl std::fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of `tournament_dates`. Either day may be an empty string while unscheduled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TournamentDates {
    #[serde(default)]
    pub day1: String,
    #[serde(default)]
    pub day2: String,
}

impl TournamentDates {
    /// Each non-empty day must be a `YYYY-MM-DD` date.
    pub fn invalid_day(&self) -> Option<&'static str> {
        [("day1", &self.day1), ("day2", &self.day2)]
            .into_iter()
            .find(|(_, v)| !v.is_empty() && NaiveDate::parse_from_str(v, "%Y-%m-%d").is_err())
            .map(|(name, _)| name)
    }
}

/// Current state of the registration window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegistrationStatus {
    pub open: bool,
    pub deadline: Option<DateTime<Utc>>,
    /// Human-readable countdown, `None` when no deadline is set.
    pub remaining: Option<String>,
}

/// A single setting, as accepted by `PUT /config/:key` and returned by `GET`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConfigValue {
    #[schema(value_type = Object, example = json!(false))]
    pub value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_parse_from_storage_names() {
        for key in ConfigKey::ALL {
            assert_eq!(ConfigKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(ConfigKey::parse("theme"), None);
    }

    #[test]
    fn tournament_dates_accept_blank_days() {
        let dates = TournamentDates {
            day1: "2026-11-07".into(),
            day2: String::new(),
        };
        assert_eq!(dates.invalid_day(), None);

        let bad = TournamentDates {
            day1: "2026-11-07".into(),
            day2: "Nov 8".into(),
        };
        assert_eq!(bad.invalid_day(), Some("day2"));
    }
}
