//! Storage contract shared by the PostgreSQL and in-memory backends.
//!
//! Reads go through [`RegistrationStore`]. Every write goes through a
//! [`StoreTx`], so a mutation and its audit entry commit or roll back together.
//! Audit entries can only be appended: neither trait can change or remove one.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    AllowedEmail, Athlete, AthleteFilter, AthleteScope, AuditFilter, AuditLogEntry, Coach,
    ConfigEntry, Dojo,
};
use crate::services::error::StoreError;

#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Open a unit of work. Dropping it without `commit` discards its writes.
    ///
    /// The in-memory backend serializes transactions, so callers must not use
    /// this trait's read methods while holding an open transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    async fn find_allowed_email(&self, email: &str) -> Result<Option<AllowedEmail>, StoreError>;
    async fn list_allowed_emails(&self) -> Result<Vec<AllowedEmail>, StoreError>;

    /// Sorted by name.
    async fn list_dojos(&self) -> Result<Vec<Dojo>, StoreError>;
    async fn find_dojo(&self, id: Uuid) -> Result<Option<Dojo>, StoreError>;

    async fn find_coach(&self, id: Uuid) -> Result<Option<Coach>, StoreError>;
    /// Sorted by name.
    async fn list_coaches(&self) -> Result<Vec<Coach>, StoreError>;

    async fn find_athlete(&self, id: Uuid) -> Result<Option<Athlete>, StoreError>;
    /// Newest first.
    async fn list_athletes(
        &self,
        scope: AthleteScope,
        filter: &AthleteFilter,
    ) -> Result<Vec<Athlete>, StoreError>;

    /// Matching entries in creation order, at most `filter.effective_limit()`.
    async fn list_audit_logs(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>, StoreError>;
    /// Every entry in `seq` order.
    async fn audit_chain(&self) -> Result<Vec<AuditLogEntry>, StoreError>;

    async fn list_config(&self) -> Result<Vec<ConfigEntry>, StoreError>;
    async fn find_config(&self, key: &str) -> Result<Option<ConfigEntry>, StoreError>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn find_allowed_email_by_id(&mut self, id: Uuid)
    -> Result<Option<AllowedEmail>, StoreError>;
    async fn insert_allowed_email(&mut self, entry: &AllowedEmail) -> Result<(), StoreError>;
    /// Insert unless the email exists. Returns whether a row was written.
    async fn seed_allowed_email(&mut self, entry: &AllowedEmail) -> Result<bool, StoreError>;
    async fn set_allowed_email_admin(
        &mut self,
        id: Uuid,
        is_admin: bool,
    ) -> Result<Option<AllowedEmail>, StoreError>;
    async fn delete_allowed_email(&mut self, id: Uuid) -> Result<Option<AllowedEmail>, StoreError>;
    async fn count_admins(&mut self) -> Result<i64, StoreError>;

    async fn find_dojo(&mut self, id: Uuid) -> Result<Option<Dojo>, StoreError>;
    async fn insert_dojo(&mut self, dojo: &Dojo) -> Result<(), StoreError>;
    async fn rename_dojo(&mut self, id: Uuid, name: &str) -> Result<Option<Dojo>, StoreError>;
    async fn delete_dojo(&mut self, id: Uuid) -> Result<bool, StoreError>;

    async fn find_coach(&mut self, id: Uuid) -> Result<Option<Coach>, StoreError>;
    async fn insert_coach(&mut self, coach: &Coach) -> Result<(), StoreError>;
    async fn update_coach(&mut self, coach: &Coach) -> Result<(), StoreError>;

    /// Locks the row until the transaction ends.
    async fn find_athlete(&mut self, id: Uuid) -> Result<Option<Athlete>, StoreError>;
    async fn insert_athlete(&mut self, athlete: &Athlete) -> Result<(), StoreError>;
    async fn update_athlete(&mut self, athlete: &Athlete) -> Result<(), StoreError>;
    async fn delete_athlete(&mut self, id: Uuid) -> Result<bool, StoreError>;

    /// Hash of the newest audit entry. Holds the chain lock until the
    /// transaction ends, so the following `append_audit` extends this exact head.
    async fn last_audit_hash(&mut self) -> Result<Option<String>, StoreError>;
    /// Append an entry and return its assigned `seq`.
    async fn append_audit(&mut self, entry: &AuditLogEntry) -> Result<i64, StoreError>;

    /// Insert unless the key exists. Returns whether a row was written.
    async fn seed_config(&mut self, entry: &ConfigEntry) -> Result<bool, StoreError>;
    /// Overwrite an existing key. Returns false when the key was never seeded.
    async fn update_config(&mut self, entry: &ConfigEntry) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
