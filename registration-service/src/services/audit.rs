//! Audit trail writer and admin views.
//!
//! There is deliberately no way to change or remove an entry through this type.

use chrono::{SubsecRound, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    AuditAction, AuditFilter, AuditLogEntry, AuditSummary, ChainVerification, GENESIS_HASH,
    audit_log,
};
use crate::services::access::{AccessControl, Action, Resource};
use crate::services::error::RegistrationError;
use crate::services::identity::Caller;
use crate::services::metrics::AUDIT_APPENDS_TOTAL;
use crate::services::store::{RegistrationStore, StoreTx};

#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn RegistrationStore>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    /// Append an entry inside `tx`, chained onto the current head.
    ///
    /// The entry only becomes durable when `tx` commits, together with the
    /// mutation it describes.
    #[instrument(skip(self, tx, actor, snapshot), fields(user_id = %actor.user_id, action = %action))]
    pub async fn record(
        &self,
        tx: &mut dyn StoreTx,
        actor: &Caller,
        action: AuditAction,
        snapshot: Value,
        dojo_name: &str,
    ) -> Result<AuditLogEntry, RegistrationError> {
        AccessControl::authorize(Some(actor), Action::Insert, &Resource::AuditLog)?;

        let prev_hash = tx
            .last_audit_hash()
            .await?
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let mut entry = AuditLogEntry {
            seq: 0,
            id: Uuid::new_v4(),
            action,
            athlete_snapshot: snapshot,
            coach_id: actor.user_id,
            coach_email: actor.email.clone(),
            dojo_name: dojo_name.to_string(),
            prev_hash,
            entry_hash: String::new(),
            // PostgreSQL keeps microseconds; the hash must survive a round trip.
            created_at: Utc::now().trunc_subsecs(6),
        };
        entry.entry_hash = entry.compute_hash();
        entry.seq = tx.append_audit(&entry).await?;

        AUDIT_APPENDS_TOTAL
            .with_label_values(&[action.as_str()])
            .inc();

        Ok(entry)
    }

    /// Matching entries in creation order. Admin only.
    pub async fn read(
        &self,
        caller: &Caller,
        filter: &AuditFilter,
    ) -> Result<Vec<AuditLogEntry>, RegistrationError> {
        AccessControl::authorize(Some(caller), Action::Read, &Resource::AuditLog)?;
        Ok(self.store.list_audit_logs(filter).await?)
    }

    pub async fn summary(&self, caller: &Caller) -> Result<AuditSummary, RegistrationError> {
        AccessControl::authorize(Some(caller), Action::Read, &Resource::AuditLog)?;
        let entries = self.store.audit_chain().await?;
        Ok(AuditSummary::from_entries(&entries))
    }

    /// Recompute every link from the first entry. Admin only.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn verify_chain(
        &self,
        caller: &Caller,
    ) -> Result<ChainVerification, RegistrationError> {
        AccessControl::authorize(Some(caller), Action::Read, &Resource::AuditLog)?;
        let entries = self.store.audit_chain().await?;
        let result = audit_log::verify_chain(&entries);

        if result.intact {
            info!(entries = result.entries_checked, "Audit chain verified");
        } else {
            warn!(
                entries = result.entries_checked,
                first_break_at = ?result.first_break_at,
                "Audit chain is broken"
            );
        }
        Ok(result)
    }
}
