//! Whitelist admission.
//!
//! The identity provider proves who the caller is. Whether they may use the
//! system, and whether they are an admin, is decided here from `allowed_emails`
//! alone, on every request.

use serde::Serialize;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::services::error::RegistrationError;
use crate::services::store::RegistrationStore;
use crate::utils::validation::normalize_email;

/// An authenticated but not yet admitted identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

/// An admitted caller. Lives for one request only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub allowed: bool,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct IdentityGate {
    store: Arc<dyn RegistrationStore>,
}

impl IdentityGate {
    pub fn new(store: Arc<dyn RegistrationStore>) -> Self {
        Self { store }
    }

    /// Look the email up in the whitelist. Never consults any other table.
    #[instrument(skip(self))]
    pub async fn resolve(&self, email: &str) -> Result<Verdict, RegistrationError> {
        let entry = self
            .store
            .find_allowed_email(&normalize_email(email))
            .await?;

        Ok(match entry {
            Some(row) => Verdict {
                allowed: true,
                is_admin: row.is_admin,
            },
            None => Verdict {
                allowed: false,
                is_admin: false,
            },
        })
    }

    /// Admit `identity` or fail with `NotWhitelisted` before anything else runs.
    pub async fn admit(&self, identity: &Identity) -> Result<Caller, RegistrationError> {
        let verdict = self.resolve(&identity.email).await?;
        if !verdict.allowed {
            warn!(user_id = %identity.user_id, "Identity is not whitelisted");
            return Err(RegistrationError::NotWhitelisted(normalize_email(
                &identity.email,
            )));
        }

        Ok(Caller {
            user_id: identity.user_id,
            email: normalize_email(&identity.email),
            is_admin: verdict.is_admin,
        })
    }
}
