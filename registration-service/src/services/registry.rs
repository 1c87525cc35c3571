//! Athlete lifecycle.
//!
//! Every write runs the same gauntlet: the caller has been admitted, the
//! coach has finished onboarding, the input is valid, access control agrees,
//! and the registration window is open unless the caller is an admin. The
//! insert, update or delete then commits in one transaction with its audit
//! entry.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use service_core::error::FieldIssue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Athlete, AthleteFilter, AthleteInput, AthletePatch, AthleteStats, AuditAction, BeltRank,
    Coach, CompetitionDay, Gender, NewAthlete,
};
use crate::services::access::{AccessControl, Action, Resource};
use crate::services::audit::AuditLogger;
use crate::services::config_gate::ConfigGate;
use crate::services::error::{ATHLETE_UNIQUE, RegistrationError, StoreError};
use crate::services::identity::Caller;
use crate::services::metrics::ATHLETE_MUTATIONS_TOTAL;
use crate::services::store::{RegistrationStore, StoreTx};
use crate::utils::validation::{field_issues, parse_date_of_birth, title_case};

/// Largest batch accepted by [`AthleteRegistry::bulk_register`].
pub const MAX_BULK_SIZE: usize = 500;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkRejection {
    /// Position of the row in the submitted batch.
    pub index: usize,
    pub input: AthleteInput,
    #[schema(value_type = String, example = "duplicate_athlete")]
    pub code: &'static str,
    pub reason: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<crate::dtos::FieldError>)]
    pub fields: Vec<FieldIssue>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct BulkOutcome {
    pub succeeded: Vec<Athlete>,
    pub rejected: Vec<BulkRejection>,
}

#[derive(Clone)]
pub struct AthleteRegistry {
    store: Arc<dyn RegistrationStore>,
    config: ConfigGate,
    audit: AuditLogger,
}

impl AthleteRegistry {
    pub fn new(store: Arc<dyn RegistrationStore>, config: ConfigGate, audit: AuditLogger) -> Self {
        Self {
            store,
            config,
            audit,
        }
    }

    #[instrument(skip(self, caller, input), fields(user_id = %caller.user_id))]
    pub async fn register(
        &self,
        caller: &Caller,
        input: AthleteInput,
    ) -> Result<Athlete, RegistrationError> {
        let result = self.register_inner(caller, input).await;
        record_outcome("register", &result);
        result
    }

    async fn register_inner(
        &self,
        caller: &Caller,
        input: AthleteInput,
    ) -> Result<Athlete, RegistrationError> {
        let coach = self.onboarded_coach(caller).await?;
        let new = prepare(&input)?;
        AccessControl::authorize(
            Some(caller),
            Action::Insert,
            &Resource::Athlete { coach_id: coach.id },
        )?;
        self.ensure_window(caller).await?;
        let dojo_name = self.dojo_name(&coach).await?;

        self.insert_audited(caller, &coach, &dojo_name, new, AuditAction::Register)
            .await
    }

    /// Register each row independently. Rows that fail validation or collide
    /// with an existing athlete are reported back; accepted rows stay committed.
    ///
    /// Onboarding, access and the registration window are checked once for the
    /// whole batch and abort it.
    #[instrument(skip(self, caller, inputs), fields(user_id = %caller.user_id, rows = inputs.len()))]
    pub async fn bulk_register(
        &self,
        caller: &Caller,
        inputs: Vec<AthleteInput>,
    ) -> Result<BulkOutcome, RegistrationError> {
        if inputs.is_empty() {
            return Err(RegistrationError::invalid("athletes", "No athletes submitted"));
        }
        if inputs.len() > MAX_BULK_SIZE {
            return Err(RegistrationError::invalid(
                "athletes",
                format!("At most {} athletes per upload", MAX_BULK_SIZE),
            ));
        }

        let coach = self.onboarded_coach(caller).await?;
        AccessControl::authorize(
            Some(caller),
            Action::Insert,
            &Resource::Athlete { coach_id: coach.id },
        )?;
        self.ensure_window(caller).await?;
        let dojo_name = self.dojo_name(&coach).await?;

        let mut outcome = BulkOutcome::default();
        for (index, input) in inputs.into_iter().enumerate() {
            let result = match prepare(&input) {
                Ok(new) => {
                    self.insert_audited(caller, &coach, &dojo_name, new, AuditAction::BulkRegister)
                        .await
                }
                Err(e) => Err(e),
            };
            record_outcome("bulk_register", &result);

            match result {
                Ok(athlete) => outcome.succeeded.push(athlete),
                Err(
                    e @ (RegistrationError::ValidationError(_)
                    | RegistrationError::DuplicateAthlete { .. }),
                ) => {
                    outcome.rejected.push(BulkRejection {
                        index,
                        input,
                        code: e.kind(),
                        reason: describe(&e),
                        fields: e.field_issues(),
                    });
                }
                // Anything else is not about this row.
                Err(e) => return Err(e),
            }
        }

        info!(
            succeeded = outcome.succeeded.len(),
            rejected = outcome.rejected.len(),
            "Bulk registration processed"
        );
        Ok(outcome)
    }

    #[instrument(skip(self, caller, patch), fields(user_id = %caller.user_id))]
    pub async fn update(
        &self,
        caller: &Caller,
        id: Uuid,
        patch: AthletePatch,
    ) -> Result<Athlete, RegistrationError> {
        let result = self.update_inner(caller, id, patch).await;
        record_outcome("update", &result);
        result
    }

    async fn update_inner(
        &self,
        caller: &Caller,
        id: Uuid,
        patch: AthletePatch,
    ) -> Result<Athlete, RegistrationError> {
        patch
            .validate()
            .map_err(|e| RegistrationError::ValidationError(field_issues(&e)))?;
        if patch.is_empty() {
            return Err(RegistrationError::invalid("body", "No fields to update"));
        }
        let open = self.config.is_registration_open().await?;

        let mut tx = self.store.begin().await?;
        let current = tx
            .find_athlete(id)
            .await?
            .ok_or(RegistrationError::NotFound("Athlete"))?;
        AccessControl::authorize(
            Some(caller),
            Action::Update,
            &Resource::Athlete {
                coach_id: current.coach_id,
            },
        )?;
        window_allows(caller, open)?;

        let mut updated = current.clone();
        let changed = apply_patch(&mut updated, &patch)?;
        if changed.is_empty() {
            tx.rollback().await?;
            return Ok(current);
        }
        updated.updated_at = Utc::now();
        tx.update_athlete(&updated)
            .await
            .map_err(|e| duplicate(e, &updated))?;

        let dojo_name = tx_dojo_name(tx.as_mut(), updated.dojo_id).await?;
        self.audit
            .record(
                tx.as_mut(),
                caller,
                AuditAction::Update,
                json!({ "athlete": updated, "changed_fields": changed }),
                &dojo_name,
            )
            .await?;
        tx.commit().await?;

        info!(athlete_id = %id, ?changed, "Athlete updated");
        Ok(updated)
    }

    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn delete(&self, caller: &Caller, id: Uuid) -> Result<(), RegistrationError> {
        let result = self.delete_inner(caller, id).await;
        record_outcome("delete", &result);
        result
    }

    async fn delete_inner(&self, caller: &Caller, id: Uuid) -> Result<(), RegistrationError> {
        let open = self.config.is_registration_open().await?;

        let mut tx = self.store.begin().await?;
        let athlete = tx
            .find_athlete(id)
            .await?
            .ok_or(RegistrationError::NotFound("Athlete"))?;
        AccessControl::authorize(
            Some(caller),
            Action::Delete,
            &Resource::Athlete {
                coach_id: athlete.coach_id,
            },
        )?;
        window_allows(caller, open)?;

        if !tx.delete_athlete(id).await? {
            return Err(RegistrationError::NotFound("Athlete"));
        }

        let dojo_name = tx_dojo_name(tx.as_mut(), athlete.dojo_id).await?;
        let snapshot = serde_json::to_value(&athlete).map_err(anyhow::Error::from)?;
        self.audit
            .record(tx.as_mut(), caller, AuditAction::Delete, snapshot, &dojo_name)
            .await?;
        tx.commit().await?;

        info!(athlete_id = %id, "Athlete deleted");
        Ok(())
    }

    pub async fn get(&self, caller: &Caller, id: Uuid) -> Result<Athlete, RegistrationError> {
        let athlete = self
            .store
            .find_athlete(id)
            .await?
            .ok_or(RegistrationError::NotFound("Athlete"))?;
        AccessControl::authorize(
            Some(caller),
            Action::Read,
            &Resource::Athlete {
                coach_id: athlete.coach_id,
            },
        )?;
        Ok(athlete)
    }

    /// Athletes visible to `caller`, newest first.
    pub async fn list(
        &self,
        caller: &Caller,
        filter: &AthleteFilter,
    ) -> Result<Vec<Athlete>, RegistrationError> {
        let scope = AccessControl::athlete_scope(caller);
        Ok(self.store.list_athletes(scope, filter).await?)
    }

    pub async fn stats(&self, caller: &Caller) -> Result<AthleteStats, RegistrationError> {
        let athletes = self.list(caller, &AthleteFilter::default()).await?;
        let dojo_names: HashMap<Uuid, String> = self
            .store
            .list_dojos()
            .await?
            .into_iter()
            .map(|d| (d.id, d.name))
            .collect();
        Ok(AthleteStats::from_athletes(&athletes, &dojo_names))
    }

    async fn onboarded_coach(&self, caller: &Caller) -> Result<Coach, RegistrationError> {
        match self.store.find_coach(caller.user_id).await? {
            Some(coach) if coach.onboarding_complete => Ok(coach),
            _ => Err(RegistrationError::forbidden(
                "Complete onboarding before registering athletes",
            )),
        }
    }

    async fn ensure_window(&self, caller: &Caller) -> Result<(), RegistrationError> {
        if caller.is_admin {
            return Ok(());
        }
        let open = self.config.is_registration_open().await?;
        window_allows(caller, open)
    }

    async fn dojo_name(&self, coach: &Coach) -> Result<String, RegistrationError> {
        self.store
            .find_dojo(coach.dojo_id)
            .await?
            .map(|d| d.name)
            .ok_or(RegistrationError::NotFound("Dojo"))
    }

    async fn insert_audited(
        &self,
        caller: &Caller,
        coach: &Coach,
        dojo_name: &str,
        new: NewAthlete,
        action: AuditAction,
    ) -> Result<Athlete, RegistrationError> {
        let now = Utc::now();
        let athlete = Athlete {
            id: Uuid::new_v4(),
            coach_id: coach.id,
            dojo_id: coach.dojo_id,
            full_name: new.full_name,
            date_of_birth: new.date_of_birth,
            gender: new.gender,
            belt_rank: new.belt_rank,
            weight_kg: new.weight_kg,
            competition_day: new.competition_day,
            kata_event: new.kata_event,
            kumite_event: new.kumite_event,
            created_at: now,
            updated_at: now,
        };
        let snapshot = serde_json::to_value(&athlete).map_err(anyhow::Error::from)?;

        let mut tx = self.store.begin().await?;
        // The unique constraint decides duplicates, not a prior lookup.
        tx.insert_athlete(&athlete)
            .await
            .map_err(|e| duplicate(e, &athlete))?;
        self.audit
            .record(tx.as_mut(), caller, action, snapshot, dojo_name)
            .await?;
        tx.commit().await?;

        info!(athlete_id = %athlete.id, dojo = %dojo_name, action = %action, "Athlete registered");
        Ok(athlete)
    }
}

fn duplicate(err: StoreError, athlete: &Athlete) -> RegistrationError {
    match err {
        StoreError::UniqueViolation { ref constraint } if constraint == ATHLETE_UNIQUE => {
            RegistrationError::DuplicateAthlete {
                full_name: athlete.full_name.clone(),
                date_of_birth: athlete.date_of_birth,
            }
        }
        other => other.into(),
    }
}

fn window_allows(caller: &Caller, open: bool) -> Result<(), RegistrationError> {
    if open || caller.is_admin {
        Ok(())
    } else {
        warn!(user_id = %caller.user_id, "Write attempted while registration is closed");
        Err(RegistrationError::RegistrationClosed)
    }
}

async fn tx_dojo_name(tx: &mut dyn StoreTx, dojo_id: Uuid) -> Result<String, RegistrationError> {
    tx.find_dojo(dojo_id)
        .await?
        .map(|d| d.name)
        .ok_or(RegistrationError::NotFound("Dojo"))
}

/// Validate and normalize one submitted athlete.
fn prepare(input: &AthleteInput) -> Result<NewAthlete, RegistrationError> {
    input
        .validate()
        .map_err(|e| RegistrationError::ValidationError(field_issues(&e)))?;

    Ok(NewAthlete {
        full_name: title_case(&input.full_name),
        date_of_birth: parse_date_of_birth(&input.date_of_birth)
            .ok_or_else(|| RegistrationError::invalid("date_of_birth", "Invalid date"))?,
        gender: Gender::parse(&input.gender)
            .ok_or_else(|| RegistrationError::invalid("gender", "Invalid gender"))?,
        belt_rank: BeltRank::parse(&input.belt_rank)
            .ok_or_else(|| RegistrationError::invalid("belt_rank", "Invalid belt rank"))?,
        weight_kg: input.weight_kg,
        competition_day: CompetitionDay::parse(&input.competition_day).ok_or_else(|| {
            RegistrationError::invalid("competition_day", "Invalid competition day")
        })?,
        kata_event: input.kata_event,
        kumite_event: input.kumite_event,
    })
}

/// Apply an already validated patch and return the names of fields that changed.
fn apply_patch(
    athlete: &mut Athlete,
    patch: &AthletePatch,
) -> Result<Vec<&'static str>, RegistrationError> {
    let mut changed = Vec::new();

    macro_rules! set {
        ($field:ident, $value:expr) => {
            let value = $value;
            if athlete.$field != value {
                athlete.$field = value;
                changed.push(stringify!($field));
            }
        };
    }

    if let Some(name) = &patch.full_name {
        set!(full_name, title_case(name));
    }
    if let Some(dob) = &patch.date_of_birth {
        let dob = parse_date_of_birth(dob)
            .ok_or_else(|| RegistrationError::invalid("date_of_birth", "Invalid date"))?;
        set!(date_of_birth, dob);
    }
    if let Some(gender) = &patch.gender {
        let gender = Gender::parse(gender)
            .ok_or_else(|| RegistrationError::invalid("gender", "Invalid gender"))?;
        set!(gender, gender);
    }
    if let Some(belt) = &patch.belt_rank {
        let belt = BeltRank::parse(belt)
            .ok_or_else(|| RegistrationError::invalid("belt_rank", "Invalid belt rank"))?;
        set!(belt_rank, belt);
    }
    if patch.clear_weight {
        set!(weight_kg, None);
    } else if let Some(weight) = patch.weight_kg {
        set!(weight_kg, Some(weight));
    }
    if let Some(day) = &patch.competition_day {
        let day = CompetitionDay::parse(day).ok_or_else(|| {
            RegistrationError::invalid("competition_day", "Invalid competition day")
        })?;
        set!(competition_day, day);
    }
    if let Some(kata) = patch.kata_event {
        set!(kata_event, kata);
    }
    if let Some(kumite) = patch.kumite_event {
        set!(kumite_event, kumite);
    }

    if !athlete.kata_event && !athlete.kumite_event {
        return Err(RegistrationError::invalid(
            "events",
            "At least one event (Kata or Kumite) must be selected",
        ));
    }
    Ok(changed)
}

fn describe(err: &RegistrationError) -> String {
    match err {
        RegistrationError::ValidationError(issues) => issues
            .iter()
            .map(|i| format!("{}: {}", i.field, i.message))
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

fn record_outcome<T>(action: &str, result: &Result<T, RegistrationError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(RegistrationError::DuplicateAthlete { .. }) => "duplicate",
        Err(RegistrationError::RegistrationClosed) => "closed",
        Err(RegistrationError::Forbidden(_) | RegistrationError::NotWhitelisted(_)) => "forbidden",
        Err(RegistrationError::ValidationError(_)) => "invalid",
        Err(RegistrationError::NotFound(_)) => "not_found",
        Err(_) => "error",
    };
    ATHLETE_MUTATIONS_TOTAL
        .with_label_values(&[action, outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn athlete() -> Athlete {
        Athlete {
            id: Uuid::new_v4(),
            coach_id: Uuid::new_v4(),
            dojo_id: Uuid::new_v4(),
            full_name: "A. Lee".into(),
            date_of_birth: NaiveDate::from_ymd_opt(2010, 5, 1).unwrap(),
            gender: Gender::Female,
            belt_rank: BeltRank::Green,
            weight_kg: Some(42.5),
            competition_day: CompetitionDay::Day1,
            kata_event: true,
            kumite_event: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn prepare_normalizes_the_name() {
        let input = AthleteInput {
            full_name: "  a. lee ".into(),
            date_of_birth: "2010-05-01".into(),
            gender: "Female".into(),
            belt_rank: "Black 1st Dan".into(),
            weight_kg: None,
            competition_day: "Both".into(),
            kata_event: false,
            kumite_event: true,
        };
        let new = prepare(&input).unwrap();
        assert_eq!(new.full_name, "A. Lee");
        assert_eq!(new.belt_rank, BeltRank::Black1stDan);
        assert_eq!(new.competition_day, CompetitionDay::Both);
    }

    #[test]
    fn patch_reports_only_real_changes() {
        let mut a = athlete();
        let patch = AthletePatch {
            full_name: Some("a. lee".into()),
            belt_rank: Some("Blue".into()),
            clear_weight: true,
            ..Default::default()
        };
        let changed = apply_patch(&mut a, &patch).unwrap();
        assert_eq!(changed, vec!["belt_rank", "weight_kg"]);
        assert_eq!(a.weight_kg, None);
    }

    #[test]
    fn patch_cannot_drop_both_events() {
        let mut a = athlete();
        let patch = AthletePatch {
            kata_event: Some(false),
            ..Default::default()
        };
        let err = apply_patch(&mut a, &patch).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn window_is_bypassed_by_admins_only() {
        let mut caller = Caller {
            user_id: Uuid::new_v4(),
            email: "coach@x.com".into(),
            is_admin: false,
        };
        assert!(matches!(
            window_allows(&caller, false),
            Err(RegistrationError::RegistrationClosed)
        ));
        caller.is_admin = true;
        assert!(window_allows(&caller, false).is_ok());
    }
}
