//! Whitelist management and admin bootstrap.
//!
//! The whitelist is the only source of admission and of the admin role, so the
//! last admin row can never be demoted or removed.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::models::{AllowedEmail, NewAllowedEmail};
use crate::services::access::{AccessControl, Action, Resource};
use crate::services::error::{ALLOWED_EMAIL_UNIQUE, RegistrationError, StoreError};
use crate::services::identity::Caller;
use crate::services::store::{RegistrationStore, StoreTx};
use crate::utils::validation::{field_issues, normalize_email};

#[derive(Clone)]
pub struct Whitelist {
    store: Arc<dyn RegistrationStore>,
}

impl Whitelist {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, caller: &Caller) -> Result<Vec<AllowedEmail>, RegistrationError> {
        // Reading rows other than one's own.
        AccessControl::authorize(Some(caller), Action::Read, &Resource::AllowedEmail { email: "" })?;
        Ok(self.store.list_allowed_emails().await?)
    }

    #[instrument(skip(self, caller, request), fields(user_id = %caller.user_id))]
    pub async fn add(
        &self,
        caller: &Caller,
        request: NewAllowedEmail,
    ) -> Result<AllowedEmail, RegistrationError> {
        let request = NewAllowedEmail {
            email: normalize_email(&request.email),
            ..request
        };
        request
            .validate()
            .map_err(|e| RegistrationError::ValidationError(field_issues(&e)))?;
        AccessControl::authorize(
            Some(caller),
            Action::Insert,
            &Resource::AllowedEmail {
                email: &request.email,
            },
        )?;

        let entry = AllowedEmail {
            id: Uuid::new_v4(),
            email: request.email,
            is_admin: request.is_admin,
            added_by: Some(caller.user_id),
            created_at: Utc::now(),
        };

        let mut tx = self.store.begin().await?;
        tx.insert_allowed_email(&entry).await.map_err(|e| match e {
            StoreError::UniqueViolation { ref constraint } if constraint == ALLOWED_EMAIL_UNIQUE => {
                RegistrationError::DuplicateEmail(entry.email.clone())
            }
            other => other.into(),
        })?;
        tx.commit().await?;

        info!(email = %entry.email, is_admin = entry.is_admin, "Email whitelisted");
        Ok(entry)
    }

    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn set_admin(
        &self,
        caller: &Caller,
        id: Uuid,
        is_admin: bool,
    ) -> Result<AllowedEmail, RegistrationError> {
        let mut tx = self.store.begin().await?;
        let current = find(tx.as_mut(), id).await?;
        AccessControl::authorize(
            Some(caller),
            Action::Update,
            &Resource::AllowedEmail {
                email: &current.email,
            },
        )?;
        if current.is_admin && !is_admin {
            ensure_other_admin(tx.as_mut()).await?;
        }

        let updated = tx
            .set_allowed_email_admin(id, is_admin)
            .await?
            .ok_or(RegistrationError::NotFound("Allowed email"))?;
        tx.commit().await?;

        info!(email = %updated.email, is_admin, "Admin flag changed");
        Ok(updated)
    }

    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn remove(&self, caller: &Caller, id: Uuid) -> Result<(), RegistrationError> {
        let mut tx = self.store.begin().await?;
        let current = find(tx.as_mut(), id).await?;
        AccessControl::authorize(
            Some(caller),
            Action::Delete,
            &Resource::AllowedEmail {
                email: &current.email,
            },
        )?;
        if current.is_admin {
            ensure_other_admin(tx.as_mut()).await?;
        }

        tx.delete_allowed_email(id)
            .await?
            .ok_or(RegistrationError::NotFound("Allowed email"))?;
        tx.commit().await?;

        info!(email = %current.email, "Email removed from whitelist");
        Ok(())
    }
}

/// Whitelist `email` as an admin unless it is already listed.
pub async fn bootstrap_admin(
    store: &dyn RegistrationStore,
    email: &str,
) -> Result<bool, RegistrationError> {
    let entry = AllowedEmail {
        id: Uuid::new_v4(),
        email: normalize_email(email),
        is_admin: true,
        added_by: None,
        created_at: Utc::now(),
    };

    let mut tx = store.begin().await?;
    let inserted = tx.seed_allowed_email(&entry).await?;
    tx.commit().await?;

    if inserted {
        info!(email = %entry.email, "Bootstrap admin whitelisted");
    } else {
        warn!(email = %entry.email, "Bootstrap email already whitelisted; left unchanged");
    }
    Ok(inserted)
}

async fn find(tx: &mut dyn StoreTx, id: Uuid) -> Result<AllowedEmail, RegistrationError> {
    tx.find_allowed_email_by_id(id)
        .await?
        .ok_or(RegistrationError::NotFound("Allowed email"))
}

async fn ensure_other_admin(tx: &mut dyn StoreTx) -> Result<(), RegistrationError> {
    if tx.count_admins().await? <= 1 {
        return Err(RegistrationError::Conflict(
            "The last admin cannot be removed or demoted".to_string(),
        ));
    }
    Ok(())
}
