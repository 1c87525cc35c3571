//! Global tournament settings and the registration window.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::TournamentSettings;
use crate::models::{ConfigEntry, ConfigKey, RegistrationStatus, TournamentDates};
use crate::services::access::{AccessControl, Action, Resource};
use crate::services::error::RegistrationError;
use crate::services::identity::Caller;
use crate::services::store::RegistrationStore;

#[derive(Clone)]
pub struct ConfigGate {
    store: Arc<dyn RegistrationStore>,
}

impl ConfigGate {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    /// Insert any missing default. Existing values are never overwritten.
    #[instrument(skip(self, defaults))]
    pub async fn seed(&self, defaults: &TournamentSettings) -> Result<usize, RegistrationError> {
        let now = Utc::now();
        let rows = [
            (ConfigKey::TournamentName, json!(defaults.name)),
            (
                ConfigKey::TournamentDates,
                json!(TournamentDates {
                    day1: defaults.day1.clone(),
                    day2: defaults.day2.clone(),
                }),
            ),
            (ConfigKey::RegistrationOpen, json!(true)),
            (
                ConfigKey::RegistrationDeadline,
                json!(defaults.registration_deadline.map(format_deadline)),
            ),
        ];

        let mut tx = self.store.begin().await?;
        let mut seeded = 0;
        for (key, value) in rows {
            let entry = ConfigEntry {
                key: key.to_string(),
                value,
                updated_at: now,
                updated_by: None,
            };
            if tx.seed_config(&entry).await? {
                seeded += 1;
            }
        }
        tx.commit().await?;

        info!(seeded, "Tournament configuration seeded");
        Ok(seeded)
    }

    /// Every stored setting, keyed by name.
    pub async fn all(&self) -> Result<BTreeMap<String, Value>, RegistrationError> {
        AccessControl::authorize(None, Action::Read, &Resource::Config)?;
        let rows = self.store.list_config().await?;
        Ok(rows.into_iter().map(|e| (e.key, e.value)).collect())
    }

    pub async fn get(&self, key: &str) -> Result<Value, RegistrationError> {
        AccessControl::authorize(None, Action::Read, &Resource::Config)?;
        let key = ConfigKey::parse(key).ok_or(RegistrationError::NotFound("Config key"))?;
        self.store
            .find_config(key.as_str())
            .await?
            .map(|e| e.value)
            .ok_or(RegistrationError::NotFound("Config key"))
    }

    /// Admin-only write of a known key, with the value shape checked per key.
    #[instrument(skip(self, caller, value), fields(user_id = %caller.user_id))]
    pub async fn set(
        &self,
        caller: &Caller,
        key: &str,
        value: Value,
    ) -> Result<ConfigEntry, RegistrationError> {
        AccessControl::authorize(Some(caller), Action::Update, &Resource::Config)?;
        let key = ConfigKey::parse(key).ok_or(RegistrationError::NotFound("Config key"))?;
        let value = normalize_value(key, value)?;

        let entry = ConfigEntry {
            key: key.to_string(),
            value,
            updated_at: Utc::now(),
            updated_by: Some(caller.user_id),
        };

        let mut tx = self.store.begin().await?;
        if !tx.update_config(&entry).await? {
            tx.rollback().await?;
            return Err(RegistrationError::NotFound("Config key"));
        }
        tx.commit().await?;

        info!(key = %key, "Configuration updated");
        Ok(entry)
    }

    /// `registration_open` is set and the deadline, if any, has not passed.
    pub async fn is_registration_open(&self) -> Result<bool, RegistrationError> {
        Ok(self.status_at(Utc::now()).await?.open)
    }

    pub async fn status(&self) -> Result<RegistrationStatus, RegistrationError> {
        self.status_at(Utc::now()).await
    }

    async fn status_at(&self, now: DateTime<Utc>) -> Result<RegistrationStatus, RegistrationError> {
        let open_flag = self
            .store
            .find_config(ConfigKey::RegistrationOpen.as_str())
            .await?
            .and_then(|e| e.value.as_bool())
            .unwrap_or(false);
        let deadline = self
            .store
            .find_config(ConfigKey::RegistrationDeadline.as_str())
            .await?
            .and_then(|e| parse_deadline(&e.value));

        Ok(RegistrationStatus {
            open: window_open(open_flag, deadline, now),
            deadline,
            remaining: deadline.map(|d| time_remaining(d, now)),
        })
    }
}

pub fn window_open(open_flag: bool, deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    open_flag && deadline.is_none_or(|d| now <= d)
}

/// "2d 3h remaining", "4h 10m remaining", "12m remaining" or "Registration closed".
pub fn time_remaining(deadline: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = deadline - now;
    if diff < chrono::Duration::zero() {
        return "Registration closed".to_string();
    }

    let days = diff.num_days();
    let hours = diff.num_hours() % 24;
    let minutes = diff.num_minutes() % 60;

    if days > 0 {
        format!("{}d {}h remaining", days, hours)
    } else if hours > 0 {
        format!("{}h {}m remaining", hours, minutes)
    } else {
        format!("{}m remaining", minutes)
    }
}

fn format_deadline(deadline: DateTime<Utc>) -> String {
    deadline.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_deadline(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

fn normalize_value(key: ConfigKey, value: Value) -> Result<Value, RegistrationError> {
    let field = key.as_str();
    match key {
        ConfigKey::TournamentName => {
            let name = value
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    RegistrationError::invalid(field, "Tournament name must be a non-empty string")
                })?;
            if name.chars().count() > 200 {
                return Err(RegistrationError::invalid(
                    field,
                    "Tournament name must be at most 200 characters",
                ));
            }
            Ok(json!(name))
        }
        ConfigKey::TournamentDates => {
            let dates: TournamentDates = serde_json::from_value(value).map_err(|_| {
                RegistrationError::invalid(field, "Expected an object with day1 and day2")
            })?;
            if let Some(day) = dates.invalid_day() {
                return Err(RegistrationError::invalid(
                    field,
                    format!("{} must be a YYYY-MM-DD date or empty", day),
                ));
            }
            Ok(json!(dates))
        }
        ConfigKey::RegistrationOpen => value
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| RegistrationError::invalid(field, "Expected true or false")),
        ConfigKey::RegistrationDeadline => match value {
            Value::Null => Ok(Value::Null),
            ref v => parse_deadline(v)
                .map(|d| json!(format_deadline(d)))
                .ok_or_else(|| {
                    RegistrationError::invalid(field, "Expected an RFC 3339 timestamp or null")
                }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 11, 1, h, m, 0).unwrap()
    }

    #[test]
    fn closed_after_deadline_even_when_flag_is_set() {
        let deadline = at(12, 0);
        assert!(window_open(true, Some(deadline), at(11, 59)));
        assert!(!window_open(true, Some(deadline), at(12, 1)));
        assert!(!window_open(false, Some(deadline), at(11, 0)));
        assert!(window_open(true, None, at(11, 0)));
    }

    #[test]
    fn remaining_time_formats() {
        let now = at(0, 0);
        assert_eq!(
            time_remaining(now + Duration::days(2) + Duration::hours(3), now),
            "2d 3h remaining"
        );
        assert_eq!(
            time_remaining(now + Duration::hours(4) + Duration::minutes(10), now),
            "4h 10m remaining"
        );
        assert_eq!(time_remaining(now + Duration::minutes(12), now), "12m remaining");
        assert_eq!(time_remaining(now - Duration::minutes(1), now), "Registration closed");
    }

    #[test]
    fn values_are_checked_per_key() {
        assert!(normalize_value(ConfigKey::RegistrationOpen, json!("yes")).is_err());
        assert_eq!(
            normalize_value(ConfigKey::RegistrationOpen, json!(false)).unwrap(),
            json!(false)
        );
        assert!(normalize_value(ConfigKey::TournamentName, json!("  ")).is_err());
        assert_eq!(
            normalize_value(ConfigKey::TournamentName, json!(" Spring Cup ")).unwrap(),
            json!("Spring Cup")
        );
        assert!(
            normalize_value(ConfigKey::TournamentDates, json!({"day1": "soon", "day2": ""}))
                .is_err()
        );
        assert_eq!(
            normalize_value(
                ConfigKey::RegistrationDeadline,
                json!("2026-11-01T12:00:00+02:00")
            )
            .unwrap(),
            json!("2026-11-01T10:00:00Z")
        );
        assert_eq!(
            normalize_value(ConfigKey::RegistrationDeadline, Value::Null).unwrap(),
            Value::Null
        );
    }
}
