//! Athlete roster entries and the inputs that create or change them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::{BTreeMap, HashMap};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::utils::validation::{
    validate_belt_rank, validate_competition_day, validate_date_of_birth, validate_events,
    validate_gender, validate_person_name,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == value)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "text")]
pub enum BeltRank {
    White,
    Yellow,
    Orange,
    Green,
    Blue,
    Purple,
    Brown,
    #[serde(rename = "Black 1st Dan")]
    #[sqlx(rename = "Black 1st Dan")]
    Black1stDan,
    #[serde(rename = "Black 2nd Dan")]
    #[sqlx(rename = "Black 2nd Dan")]
    Black2ndDan,
    #[serde(rename = "Black 3rd Dan")]
    #[sqlx(rename = "Black 3rd Dan")]
    Black3rdDan,
    #[serde(rename = "Black 4th Dan")]
    #[sqlx(rename = "Black 4th Dan")]
    Black4thDan,
    #[serde(rename = "Black 5th Dan")]
    #[sqlx(rename = "Black 5th Dan")]
    Black5thDan,
}

impl BeltRank {
    pub const ALL: [BeltRank; 12] = [
        BeltRank::White,
        BeltRank::Yellow,
        BeltRank::Orange,
        BeltRank::Green,
        BeltRank::Blue,
        BeltRank::Purple,
        BeltRank::Brown,
        BeltRank::Black1stDan,
        BeltRank::Black2ndDan,
        BeltRank::Black3rdDan,
        BeltRank::Black4thDan,
        BeltRank::Black5thDan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::White => "White",
            Self::Yellow => "Yellow",
            Self::Orange => "Orange",
            Self::Green => "Green",
            Self::Blue => "Blue",
            Self::Purple => "Purple",
            Self::Brown => "Brown",
            Self::Black1stDan => "Black 1st Dan",
            Self::Black2ndDan => "Black 2nd Dan",
            Self::Black3rdDan => "Black 3rd Dan",
            Self::Black4thDan => "Black 4th Dan",
            Self::Black5thDan => "Black 5th Dan",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text")]
pub enum CompetitionDay {
    #[serde(rename = "Day 1")]
    #[sqlx(rename = "Day 1")]
    Day1,
    #[serde(rename = "Day 2")]
    #[sqlx(rename = "Day 2")]
    Day2,
    Both,
}

impl CompetitionDay {
    pub const ALL: [CompetitionDay; 3] =
        [CompetitionDay::Day1, CompetitionDay::Day2, CompetitionDay::Both];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day1 => "Day 1",
            Self::Day2 => "Day 2",
            Self::Both => "Both",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == value)
    }
}

macro_rules! display_as_str {
    ($($ty:ty),*) => {
        $(impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_str!(Gender, BeltRank, CompetitionDay);

/// A registered athlete.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct Athlete {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub dojo_id: Uuid,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub belt_rank: BeltRank,
    pub weight_kg: Option<f64>,
    pub competition_day: CompetitionDay,
    pub kata_event: bool,
    pub kumite_event: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw athlete fields as submitted.
///
/// Enumerations stay as strings here so a bulk upload can report every bad row
/// instead of failing the whole request body at deserialization.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[validate(schema(function = "validate_events", skip_on_field_errors = false))]
pub struct AthleteInput {
    #[validate(custom(function = "validate_person_name"))]
    #[schema(example = "Aiko Tanaka")]
    pub full_name: String,
    #[validate(custom(function = "validate_date_of_birth"))]
    #[schema(example = "2012-04-18")]
    pub date_of_birth: String,
    #[validate(custom(function = "validate_gender"))]
    pub gender: String,
    #[validate(custom(function = "validate_belt_rank"))]
    pub belt_rank: String,
    #[validate(range(min = 10.0, max = 200.0, message = "Weight must be between 10 and 200 kg"))]
    pub weight_kg: Option<f64>,
    #[validate(custom(function = "validate_competition_day"))]
    pub competition_day: String,
    #[serde(default)]
    pub kata_event: bool,
    #[serde(default)]
    pub kumite_event: bool,
}

/// Validated, normalized athlete fields ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAthlete {
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub belt_rank: BeltRank,
    pub weight_kg: Option<f64>,
    pub competition_day: CompetitionDay,
    pub kata_event: bool,
    pub kumite_event: bool,
}

/// Partial update. Absent fields keep their stored value; `weight_kg: null`
/// is indistinguishable from absent, so clearing a weight uses `clear_weight`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct AthletePatch {
    #[validate(custom(function = "validate_person_name"))]
    pub full_name: Option<String>,
    #[validate(custom(function = "validate_date_of_birth"))]
    pub date_of_birth: Option<String>,
    #[validate(custom(function = "validate_gender"))]
    pub gender: Option<String>,
    #[validate(custom(function = "validate_belt_rank"))]
    pub belt_rank: Option<String>,
    #[validate(range(min = 10.0, max = 200.0, message = "Weight must be between 10 and 200 kg"))]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub clear_weight: bool,
    #[validate(custom(function = "validate_competition_day"))]
    pub competition_day: Option<String>,
    pub kata_event: Option<bool>,
    pub kumite_event: Option<bool>,
}

impl AthletePatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.date_of_birth.is_none()
            && self.gender.is_none()
            && self.belt_rank.is_none()
            && self.weight_kg.is_none()
            && !self.clear_weight
            && self.competition_day.is_none()
            && self.kata_event.is_none()
            && self.kumite_event.is_none()
    }
}

/// List filter. Every field is optional and they combine with AND.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AthleteFilter {
    /// Case-insensitive substring of the athlete's name.
    pub search: Option<String>,
    pub competition_day: Option<CompetitionDay>,
    pub belt_rank: Option<BeltRank>,
}

impl AthleteFilter {
    pub fn matches(&self, athlete: &Athlete) -> bool {
        let name_ok = match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => athlete
                .full_name
                .to_lowercase()
                .contains(&term.to_lowercase()),
            _ => true,
        };

        name_ok
            && self
                .competition_day
                .is_none_or(|day| athlete.competition_day == day)
            && self.belt_rank.is_none_or(|belt| athlete.belt_rank == belt)
    }
}

/// Rows visible to a caller when listing athletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AthleteScope {
    All,
    Coach(Uuid),
}

impl AthleteScope {
    pub fn includes(&self, athlete: &Athlete) -> bool {
        match self {
            AthleteScope::All => true,
            AthleteScope::Coach(id) => athlete.coach_id == *id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AthleteStats {
    pub total: usize,
    pub by_dojo: BTreeMap<String, usize>,
    pub by_day: BTreeMap<String, usize>,
    pub by_belt: BTreeMap<String, usize>,
    pub by_gender: BTreeMap<String, usize>,
    pub kata: usize,
    pub kumite: usize,
}

impl AthleteStats {
    /// Tally a roster. Dojos missing from `dojo_names` are keyed by id.
    pub fn from_athletes<'a>(
        athletes: impl IntoIterator<Item = &'a Athlete>,
        dojo_names: &HashMap<Uuid, String>,
    ) -> Self {
        let mut stats = AthleteStats::default();
        for athlete in athletes {
            stats.total += 1;
            let dojo = dojo_names
                .get(&athlete.dojo_id)
                .cloned()
                .unwrap_or_else(|| athlete.dojo_id.to_string());
            *stats.by_dojo.entry(dojo).or_default() += 1;
            *stats
                .by_day
                .entry(athlete.competition_day.to_string())
                .or_default() += 1;
            *stats
                .by_belt
                .entry(athlete.belt_rank.to_string())
                .or_default() += 1;
            *stats
                .by_gender
                .entry(athlete.gender.to_string())
                .or_default() += 1;
            stats.kata += usize::from(athlete.kata_event);
            stats.kumite += usize::from(athlete.kumite_event);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn belt_ranks_round_trip_through_labels() {
        for belt in BeltRank::ALL {
            assert_eq!(BeltRank::parse(belt.as_str()), Some(belt));
        }
        assert_eq!(BeltRank::parse("Black 6th Dan"), None);
    }

    #[test]
    fn competition_day_serializes_with_space() {
        let json = serde_json::to_string(&CompetitionDay::Day1).unwrap();
        assert_eq!(json, "\"Day 1\"");
        assert_eq!(CompetitionDay::parse("Day 2"), Some(CompetitionDay::Day2));
        assert_eq!(CompetitionDay::parse("day 2"), None);
    }

    fn athlete(dojo_id: Uuid, belt_rank: BeltRank) -> Athlete {
        let now = Utc::now();
        Athlete {
            id: Uuid::new_v4(),
            coach_id: Uuid::new_v4(),
            dojo_id,
            full_name: "A. Lee".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(2010, 5, 1).unwrap(),
            gender: Gender::Female,
            belt_rank,
            weight_kg: None,
            competition_day: CompetitionDay::Both,
            kata_event: true,
            kumite_event: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn stats_group_by_dojo_name() {
        let tigers = Uuid::new_v4();
        let unnamed = Uuid::new_v4();
        let names = HashMap::from([(tigers, "Tigers".to_string())]);
        let roster = [
            athlete(tigers, BeltRank::Green),
            athlete(tigers, BeltRank::Brown),
            athlete(unnamed, BeltRank::Green),
        ];

        let stats = AthleteStats::from_athletes(&roster, &names);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_dojo["Tigers"], 2);
        assert_eq!(stats.by_dojo[&unnamed.to_string()], 1);
        assert_eq!(stats.by_belt["Green"], 2);
        assert_eq!(stats.kumite, 3);
    }

    #[test]
    fn empty_patch_is_detected() {
        assert!(AthletePatch::default().is_empty());
        let patch = AthletePatch {
            kata_event: Some(true),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
