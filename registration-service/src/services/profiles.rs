//! Coach profiles and session sign-in.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::{Coach, CoachPatch, OnboardingRequest};
use crate::services::access::{AccessControl, Action, Resource};
use crate::services::error::{COACH_EMAIL_UNIQUE, RegistrationError, StoreError};
use crate::services::identity::{Caller, Identity, IdentityGate};
use crate::services::store::{RegistrationStore, StoreTx};
use crate::utils::validation::{clean_phone, field_issues, title_case};

/// What the client needs right after the identity provider signs a user in.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionInfo {
    pub allowed: bool,
    pub is_admin: bool,
    pub onboarding_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coach: Option<Coach>,
}

#[derive(Clone)]
pub struct SessionGate {
    identity: IdentityGate,
    store: Arc<dyn RegistrationStore>,
}

impl SessionGate {
    pub fn new(identity: IdentityGate, store: Arc<dyn RegistrationStore>) -> Self {
        Self { identity, store }
    }

    /// Fails with `NotWhitelisted` so the sign-in cannot complete upstream.
    #[instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn sign_in(&self, identity: &Identity) -> Result<SessionInfo, RegistrationError> {
        let caller = self.identity.admit(identity).await?;
        let coach = self.store.find_coach(caller.user_id).await?;

        info!(is_admin = caller.is_admin, "Session started");
        Ok(SessionInfo {
            allowed: true,
            is_admin: caller.is_admin,
            onboarding_complete: coach.as_ref().is_some_and(|c| c.onboarding_complete),
            coach,
        })
    }
}

#[derive(Clone)]
pub struct CoachProfiles {
    identity: IdentityGate,
    store: Arc<dyn RegistrationStore>,
}

impl CoachProfiles {
    pub fn new(identity: IdentityGate, store: Arc<dyn RegistrationStore>) -> Self {
        Self { identity, store }
    }

    /// Create the caller's profile. Whitelist admission runs before anything is written.
    #[instrument(skip(self, identity, request), fields(user_id = %identity.user_id))]
    pub async fn complete_onboarding(
        &self,
        identity: &Identity,
        request: OnboardingRequest,
    ) -> Result<Coach, RegistrationError> {
        let caller = self.identity.admit(identity).await?;
        request
            .validate()
            .map_err(|e| RegistrationError::ValidationError(field_issues(&e)))?;
        AccessControl::authorize(
            Some(&caller),
            Action::Insert,
            &Resource::Coach { id: caller.user_id },
        )?;

        let mut tx = self.store.begin().await?;
        if tx.find_coach(caller.user_id).await?.is_some() {
            return Err(RegistrationError::Conflict(
                "Onboarding is already complete".to_string(),
            ));
        }
        ensure_dojo(tx.as_mut(), request.dojo_id).await?;

        let coach = Coach {
            id: caller.user_id,
            email: caller.email.clone(),
            full_name: title_case(&request.full_name),
            phone: request.phone.as_deref().and_then(normalize_phone),
            dojo_id: request.dojo_id,
            // Display only. Authorization reads the whitelist.
            is_admin: caller.is_admin,
            onboarding_complete: true,
            created_at: Utc::now(),
        };
        tx.insert_coach(&coach).await.map_err(email_taken)?;
        tx.commit().await?;

        info!(dojo_id = %coach.dojo_id, "Coach onboarded");
        Ok(coach)
    }

    pub async fn me(&self, caller: &Caller) -> Result<Coach, RegistrationError> {
        AccessControl::authorize(
            Some(caller),
            Action::Read,
            &Resource::Coach { id: caller.user_id },
        )?;
        self.store
            .find_coach(caller.user_id)
            .await?
            .ok_or(RegistrationError::NotFound("Coach profile"))
    }

    #[instrument(skip(self, caller, patch), fields(user_id = %caller.user_id))]
    pub async fn update_me(
        &self,
        caller: &Caller,
        patch: CoachPatch,
    ) -> Result<Coach, RegistrationError> {
        patch
            .validate()
            .map_err(|e| RegistrationError::ValidationError(field_issues(&e)))?;
        AccessControl::authorize(
            Some(caller),
            Action::Update,
            &Resource::Coach { id: caller.user_id },
        )?;

        let mut tx = self.store.begin().await?;
        let mut coach = tx
            .find_coach(caller.user_id)
            .await?
            .ok_or(RegistrationError::NotFound("Coach profile"))?;

        if let Some(name) = &patch.full_name {
            coach.full_name = title_case(name);
        }
        if let Some(phone) = &patch.phone {
            coach.phone = normalize_phone(phone);
        }
        if let Some(dojo_id) = patch.dojo_id {
            ensure_dojo(tx.as_mut(), dojo_id).await?;
            coach.dojo_id = dojo_id;
        }

        tx.update_coach(&coach).await.map_err(email_taken)?;
        tx.commit().await?;

        info!("Coach profile updated");
        Ok(coach)
    }

    /// Every profile, sorted by name. Admin only.
    pub async fn list(&self, caller: &Caller) -> Result<Vec<Coach>, RegistrationError> {
        // Reading profiles other than one's own.
        AccessControl::authorize(Some(caller), Action::Read, &Resource::Coach { id: Uuid::nil() })?;
        Ok(self.store.list_coaches().await?)
    }
}

async fn ensure_dojo(tx: &mut dyn StoreTx, dojo_id: Uuid) -> Result<(), RegistrationError> {
    match tx.find_dojo(dojo_id).await? {
        Some(_) => Ok(()),
        None => Err(RegistrationError::NotFound("Dojo")),
    }
}

fn normalize_phone(phone: &str) -> Option<String> {
    let cleaned = clean_phone(phone.trim());
    (!cleaned.is_empty()).then_some(cleaned)
}

fn email_taken(err: StoreError) -> RegistrationError {
    match err {
        StoreError::UniqueViolation { ref constraint } if constraint == COACH_EMAIL_UNIQUE => {
            RegistrationError::Conflict("Another profile already uses this email".to_string())
        }
        other => other.into(),
    }
}
