//! In-memory [`RegistrationStore`] for development and tests.
//!
//! A transaction owns the state lock for its whole lifetime and works on a
//! staged copy that replaces the shared state on commit. Transactions are
//! therefore fully serialized, and constraint checks behave like the database's.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{
    AllowedEmail, Athlete, AthleteFilter, AthleteScope, AuditFilter, AuditLogEntry, Coach,
    ConfigEntry, Dojo,
};
use crate::services::error::{
    ALLOWED_EMAIL_UNIQUE, ATHLETE_UNIQUE, COACH_EMAIL_UNIQUE, DOJO_UNIQUE, StoreError,
};
use crate::services::store::{RegistrationStore, StoreTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    allowed_emails: Vec<AllowedEmail>,
    dojos: Vec<Dojo>,
    coaches: Vec<Coach>,
    athletes: Vec<Athlete>,
    audit_logs: Vec<AuditLogEntry>,
    config: Vec<ConfigEntry>,
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

fn foreign_key(constraint: &str) -> StoreError {
    StoreError::ForeignKeyViolation {
        constraint: constraint.to_string(),
    }
}

impl MemoryState {
    fn dojo_exists(&self, id: Uuid) -> bool {
        self.dojos.iter().any(|d| d.id == id)
    }

    fn check_coach(&self, coach: &Coach) -> Result<(), StoreError> {
        if !self.dojo_exists(coach.dojo_id) {
            return Err(foreign_key("coaches_dojo_id_fkey"));
        }
        if self
            .coaches
            .iter()
            .any(|c| c.id != coach.id && c.email == coach.email)
        {
            return Err(unique(COACH_EMAIL_UNIQUE));
        }
        Ok(())
    }

    fn check_athlete(&self, athlete: &Athlete) -> Result<(), StoreError> {
        if !self.coaches.iter().any(|c| c.id == athlete.coach_id) {
            return Err(foreign_key("athletes_coach_id_fkey"));
        }
        if !self.dojo_exists(athlete.dojo_id) {
            return Err(foreign_key("athletes_dojo_id_fkey"));
        }
        let duplicate = self.athletes.iter().any(|a| {
            a.id != athlete.id
                && a.full_name == athlete.full_name
                && a.date_of_birth == athlete.date_of_birth
                && a.dojo_id == athlete.dojo_id
        });
        if duplicate {
            return Err(unique(ATHLETE_UNIQUE));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_allowed_email(&self, email: &str) -> Result<Option<AllowedEmail>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .allowed_emails
            .iter()
            .find(|e| e.email == email)
            .cloned())
    }

    async fn list_allowed_emails(&self) -> Result<Vec<AllowedEmail>, StoreError> {
        let state = self.state.lock().await;
        let mut rows = state.allowed_emails.clone();
        rows.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(rows)
    }

    async fn list_dojos(&self) -> Result<Vec<Dojo>, StoreError> {
        let state = self.state.lock().await;
        let mut rows = state.dojos.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn find_dojo(&self, id: Uuid) -> Result<Option<Dojo>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.dojos.iter().find(|d| d.id == id).cloned())
    }

    async fn find_coach(&self, id: Uuid) -> Result<Option<Coach>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.coaches.iter().find(|c| c.id == id).cloned())
    }

    async fn list_coaches(&self) -> Result<Vec<Coach>, StoreError> {
        let state = self.state.lock().await;
        let mut rows = state.coaches.clone();
        rows.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(rows)
    }

    async fn find_athlete(&self, id: Uuid) -> Result<Option<Athlete>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.athletes.iter().find(|a| a.id == id).cloned())
    }

    async fn list_athletes(
        &self,
        scope: AthleteScope,
        filter: &AthleteFilter,
    ) -> Result<Vec<Athlete>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<Athlete> = state
            .athletes
            .iter()
            .rev()
            .filter(|a| scope.includes(a) && filter.matches(a))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn list_audit_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError> {
        let state = self.state.lock().await;
        let limit = usize::try_from(filter.effective_limit()).unwrap_or(usize::MAX);
        let mut rows: Vec<AuditLogEntry> = state
            .audit_logs
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }

    async fn audit_chain(&self) -> Result<Vec<AuditLogEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.audit_logs.clone())
    }

    async fn list_config(&self) -> Result<Vec<ConfigEntry>, StoreError> {
        let state = self.state.lock().await;
        let mut rows = state.config.clone();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }

    async fn find_config(&self, key: &str) -> Result<Option<ConfigEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.config.iter().find(|c| c.key == key).cloned())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_allowed_email_by_id(
        &mut self,
        id: Uuid,
    ) -> Result<Option<AllowedEmail>, StoreError> {
        Ok(self
            .staged
            .allowed_emails
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn insert_allowed_email(&mut self, entry: &AllowedEmail) -> Result<(), StoreError> {
        if self
            .staged
            .allowed_emails
            .iter()
            .any(|e| e.email == entry.email)
        {
            return Err(unique(ALLOWED_EMAIL_UNIQUE));
        }
        self.staged.allowed_emails.push(entry.clone());
        Ok(())
    }

    async fn seed_allowed_email(&mut self, entry: &AllowedEmail) -> Result<bool, StoreError> {
        match self.insert_allowed_email(entry).await {
            Ok(()) => Ok(true),
            Err(StoreError::UniqueViolation { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn set_allowed_email_admin(
        &mut self,
        id: Uuid,
        is_admin: bool,
    ) -> Result<Option<AllowedEmail>, StoreError> {
        Ok(self
            .staged
            .allowed_emails
            .iter_mut()
            .find(|e| e.id == id)
            .map(|e| {
                e.is_admin = is_admin;
                e.clone()
            }))
    }

    async fn delete_allowed_email(&mut self, id: Uuid) -> Result<Option<AllowedEmail>, StoreError> {
        let pos = self.staged.allowed_emails.iter().position(|e| e.id == id);
        Ok(pos.map(|i| self.staged.allowed_emails.remove(i)))
    }

    async fn count_admins(&mut self) -> Result<i64, StoreError> {
        Ok(self
            .staged
            .allowed_emails
            .iter()
            .filter(|e| e.is_admin)
            .count() as i64)
    }

    async fn find_dojo(&mut self, id: Uuid) -> Result<Option<Dojo>, StoreError> {
        Ok(self.staged.dojos.iter().find(|d| d.id == id).cloned())
    }

    async fn insert_dojo(&mut self, dojo: &Dojo) -> Result<(), StoreError> {
        if self.staged.dojos.iter().any(|d| d.name == dojo.name) {
            return Err(unique(DOJO_UNIQUE));
        }
        self.staged.dojos.push(dojo.clone());
        Ok(())
    }

    async fn rename_dojo(&mut self, id: Uuid, name: &str) -> Result<Option<Dojo>, StoreError> {
        if self
            .staged
            .dojos
            .iter()
            .any(|d| d.id != id && d.name == name)
        {
            return Err(unique(DOJO_UNIQUE));
        }
        Ok(self
            .staged
            .dojos
            .iter_mut()
            .find(|d| d.id == id)
            .map(|d| {
                d.name = name.to_string();
                d.clone()
            }))
    }

    async fn delete_dojo(&mut self, id: Uuid) -> Result<bool, StoreError> {
        if self.staged.coaches.iter().any(|c| c.dojo_id == id) {
            return Err(foreign_key("coaches_dojo_id_fkey"));
        }
        if self.staged.athletes.iter().any(|a| a.dojo_id == id) {
            return Err(foreign_key("athletes_dojo_id_fkey"));
        }
        let before = self.staged.dojos.len();
        self.staged.dojos.retain(|d| d.id != id);
        Ok(self.staged.dojos.len() != before)
    }

    async fn find_coach(&mut self, id: Uuid) -> Result<Option<Coach>, StoreError> {
        Ok(self.staged.coaches.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_coach(&mut self, coach: &Coach) -> Result<(), StoreError> {
        if self.staged.coaches.iter().any(|c| c.id == coach.id) {
            return Err(unique("coaches_pkey"));
        }
        self.staged.check_coach(coach)?;
        self.staged.coaches.push(coach.clone());
        Ok(())
    }

    async fn update_coach(&mut self, coach: &Coach) -> Result<(), StoreError> {
        self.staged.check_coach(coach)?;
        if let Some(slot) = self.staged.coaches.iter_mut().find(|c| c.id == coach.id) {
            *slot = coach.clone();
        }
        Ok(())
    }

    async fn find_athlete(&mut self, id: Uuid) -> Result<Option<Athlete>, StoreError> {
        Ok(self.staged.athletes.iter().find(|a| a.id == id).cloned())
    }

    async fn insert_athlete(&mut self, athlete: &Athlete) -> Result<(), StoreError> {
        self.staged.check_athlete(athlete)?;
        self.staged.athletes.push(athlete.clone());
        Ok(())
    }

    async fn update_athlete(&mut self, athlete: &Athlete) -> Result<(), StoreError> {
        self.staged.check_athlete(athlete)?;
        if let Some(slot) = self.staged.athletes.iter_mut().find(|a| a.id == athlete.id) {
            *slot = athlete.clone();
        }
        Ok(())
    }

    async fn delete_athlete(&mut self, id: Uuid) -> Result<bool, StoreError> {
        let before = self.staged.athletes.len();
        self.staged.athletes.retain(|a| a.id != id);
        Ok(self.staged.athletes.len() != before)
    }

    async fn last_audit_hash(&mut self) -> Result<Option<String>, StoreError> {
        Ok(self.staged.audit_logs.last().map(|e| e.entry_hash.clone()))
    }

    async fn append_audit(&mut self, entry: &AuditLogEntry) -> Result<i64, StoreError> {
        let seq = self.staged.audit_logs.last().map_or(1, |e| e.seq + 1);
        let mut stored = entry.clone();
        stored.seq = seq;
        self.staged.audit_logs.push(stored);
        Ok(seq)
    }

    async fn seed_config(&mut self, entry: &ConfigEntry) -> Result<bool, StoreError> {
        if self.staged.config.iter().any(|c| c.key == entry.key) {
            return Ok(false);
        }
        self.staged.config.push(entry.clone());
        Ok(true)
    }

    async fn update_config(&mut self, entry: &ConfigEntry) -> Result<bool, StoreError> {
        match self.staged.config.iter_mut().find(|c| c.key == entry.key) {
            Some(slot) => {
                *slot = entry.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dojo(name: &str) -> Dojo {
        Dojo {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn uncommitted_writes_are_discarded() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_dojo(&dojo("Tigers")).await.unwrap();
        drop(tx);

        assert!(store.list_dojos().await.unwrap().is_empty());

        let mut tx = store.begin().await.unwrap();
        tx.insert_dojo(&dojo("Tigers")).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.list_dojos().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dojo_names_are_unique() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_dojo(&dojo("Tigers")).await.unwrap();
        let err = tx.insert_dojo(&dojo("Tigers")).await.unwrap_err();
        assert!(
            matches!(err, StoreError::UniqueViolation { ref constraint } if constraint == DOJO_UNIQUE)
        );
    }

    #[tokio::test]
    async fn dojo_with_coaches_cannot_be_deleted() {
        let store = MemoryStore::new();
        let tigers = dojo("Tigers");
        let mut tx = store.begin().await.unwrap();
        tx.insert_dojo(&tigers).await.unwrap();
        tx.insert_coach(&Coach {
            id: Uuid::new_v4(),
            email: "coach@x.com".into(),
            full_name: "Coach".into(),
            phone: None,
            dojo_id: tigers.id,
            is_admin: false,
            onboarding_complete: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

        let err = tx.delete_dojo(tigers.id).await.unwrap_err();
        assert!(matches!(err, StoreError::ForeignKeyViolation { .. }));
    }
}
