//! Append-only audit trail of athlete mutations.
//!
//! Entries form a SHA-256 hash chain: each entry commits to its predecessor's
//! hash, so altering or removing a stored row breaks every later link.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// `prev_hash` of the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Register,
    Update,
    Delete,
    BulkRegister,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "REGISTER",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::BulkRegister => "BULK_REGISTER",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize, ToSchema)]
pub struct AuditLogEntry {
    /// Store-assigned insertion order. Not covered by the hash.
    pub seq: i64,
    pub id: Uuid,
    pub action: AuditAction,
    #[schema(value_type = Object)]
    pub athlete_snapshot: serde_json::Value,
    pub coach_id: Uuid,
    pub coach_email: String,
    pub dojo_name: String,
    pub prev_hash: String,
    pub entry_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Hashed portion of an entry, serialized in field order.
#[derive(Serialize)]
struct HashedBody<'a> {
    id: &'a Uuid,
    action: AuditAction,
    athlete_snapshot: &'a serde_json::Value,
    coach_id: &'a Uuid,
    coach_email: &'a str,
    dojo_name: &'a str,
    created_at: &'a DateTime<Utc>,
}

impl AuditLogEntry {
    /// SHA-256 over `prev_hash` followed by the canonical JSON of the body.
    pub fn compute_hash(&self) -> String {
        let body = HashedBody {
            id: &self.id,
            action: self.action,
            athlete_snapshot: &self.athlete_snapshot,
            coach_id: &self.coach_id,
            coach_email: &self.coach_email,
            dojo_name: &self.dojo_name,
            created_at: &self.created_at,
        };
        let json = serde_json::to_string(&body).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(self.prev_hash.as_bytes());
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    /// Case-insensitive substring of the coach email.
    pub coach_email: Option<String>,
    /// Case-insensitive substring of the dojo name.
    pub dojo_name: Option<String>,
    pub limit: Option<i64>,
}

impl AuditFilter {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 1000;

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        fn contains(haystack: &str, needle: &Option<String>) -> bool {
            match needle.as_deref().map(str::trim) {
                Some(n) if !n.is_empty() => haystack.to_lowercase().contains(&n.to_lowercase()),
                _ => true,
            }
        }

        self.action.is_none_or(|a| entry.action == a)
            && contains(&entry.coach_email, &self.coach_email)
            && contains(&entry.dojo_name, &self.dojo_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuditSummary {
    pub total: usize,
    pub by_action: BTreeMap<String, usize>,
    pub by_dojo: BTreeMap<String, usize>,
}

impl AuditSummary {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a AuditLogEntry>) -> Self {
        let mut summary = AuditSummary::default();
        for entry in entries {
            summary.total += 1;
            *summary
                .by_action
                .entry(entry.action.to_string())
                .or_default() += 1;
            *summary.by_dojo.entry(entry.dojo_name.clone()).or_default() += 1;
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChainVerification {
    pub entries_checked: usize,
    pub intact: bool,
    /// `seq` of the first entry whose link or hash does not hold.
    pub first_break_at: Option<i64>,
}

/// Walk entries in `seq` order and check every link back to [`GENESIS_HASH`].
pub fn verify_chain(entries: &[AuditLogEntry]) -> ChainVerification {
    let mut expected_prev = GENESIS_HASH.to_string();

    for entry in entries {
        if entry.prev_hash != expected_prev || entry.compute_hash() != entry.entry_hash {
            return ChainVerification {
                entries_checked: entries.len(),
                intact: false,
                first_break_at: Some(entry.seq),
            };
        }
        expected_prev = entry.entry_hash.clone();
    }

    ChainVerification {
        entries_checked: entries.len(),
        intact: true,
        first_break_at: None,
    }
}
