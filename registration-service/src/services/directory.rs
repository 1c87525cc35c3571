//! Dojo directory.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::models::{Dojo, DojoName};
use crate::services::access::{AccessControl, Action, Resource};
use crate::services::error::{DOJO_UNIQUE, RegistrationError, StoreError};
use crate::services::identity::Caller;
use crate::services::store::RegistrationStore;
use crate::utils::validation::field_issues;

#[derive(Clone)]
pub struct DojoDirectory {
    store: Arc<dyn RegistrationStore>,
}

impl DojoDirectory {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    /// Public, sorted by name.
    pub async fn list(&self) -> Result<Vec<Dojo>, RegistrationError> {
        AccessControl::authorize(None, Action::Read, &Resource::Dojo)?;
        Ok(self.store.list_dojos().await?)
    }

    /// Any admitted caller may create a dojo while onboarding.
    #[instrument(skip(self, caller, request), fields(user_id = %caller.user_id))]
    pub async fn create(
        &self,
        caller: &Caller,
        request: DojoName,
    ) -> Result<Dojo, RegistrationError> {
        AccessControl::authorize(Some(caller), Action::Insert, &Resource::Dojo)?;
        let name = clean_name(&request)?;

        let dojo = Dojo {
            id: Uuid::new_v4(),
            name: name.clone(),
            created_at: Utc::now(),
        };

        let mut tx = self.store.begin().await?;
        tx.insert_dojo(&dojo)
            .await
            .map_err(|e| duplicate_name(e, &name))?;
        tx.commit().await?;

        info!(dojo_id = %dojo.id, name = %dojo.name, "Dojo created");
        Ok(dojo)
    }

    #[instrument(skip(self, caller, request), fields(user_id = %caller.user_id))]
    pub async fn rename(
        &self,
        caller: &Caller,
        id: Uuid,
        request: DojoName,
    ) -> Result<Dojo, RegistrationError> {
        AccessControl::authorize(Some(caller), Action::Update, &Resource::Dojo)?;
        let name = clean_name(&request)?;

        let mut tx = self.store.begin().await?;
        let dojo = tx
            .rename_dojo(id, &name)
            .await
            .map_err(|e| duplicate_name(e, &name))?
            .ok_or(RegistrationError::NotFound("Dojo"))?;
        tx.commit().await?;

        info!(dojo_id = %id, name = %dojo.name, "Dojo renamed");
        Ok(dojo)
    }

    /// Blocked while any coach or athlete still belongs to the dojo.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn remove(&self, caller: &Caller, id: Uuid) -> Result<(), RegistrationError> {
        AccessControl::authorize(Some(caller), Action::Delete, &Resource::Dojo)?;

        let mut tx = self.store.begin().await?;
        let removed = tx.delete_dojo(id).await.map_err(|e| match e {
            StoreError::ForeignKeyViolation { .. } => RegistrationError::Conflict(
                "Dojo still has coaches or athletes".to_string(),
            ),
            other => other.into(),
        })?;
        if !removed {
            return Err(RegistrationError::NotFound("Dojo"));
        }
        tx.commit().await?;

        info!(dojo_id = %id, "Dojo removed");
        Ok(())
    }
}

fn clean_name(request: &DojoName) -> Result<String, RegistrationError> {
    request
        .validate()
        .map_err(|e| RegistrationError::ValidationError(field_issues(&e)))?;
    Ok(request.name.trim().to_string())
}

fn duplicate_name(err: StoreError, name: &str) -> RegistrationError {
    match err {
        StoreError::UniqueViolation { ref constraint } if constraint == DOJO_UNIQUE => {
            RegistrationError::DuplicateDojo(name.to_string())
        }
        other => other.into(),
    }
}
