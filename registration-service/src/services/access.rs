//! Row access rules.
//!
//! Decisions are a pure function of the admitted [`Caller`] and the target row.
//! Admin status arrives already resolved from the whitelist, so no rule ever
//! reads the table it protects.

use tracing::warn;
use uuid::Uuid;

use crate::models::AthleteScope;
use crate::services::error::RegistrationError;
use crate::services::identity::Caller;
use crate::services::metrics::ACCESS_DECISIONS_TOTAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    fn is_write(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// The row (or row class) being touched, with the fields the rules look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource<'a> {
    Coach { id: Uuid },
    Athlete { coach_id: Uuid },
    Dojo,
    Config,
    AllowedEmail { email: &'a str },
    AuditLog,
}

impl Resource<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Coach { .. } => "coach",
            Self::Athlete { .. } => "athlete",
            Self::Dojo => "dojo",
            Self::Config => "config",
            Self::AllowedEmail { .. } => "allowed_email",
            Self::AuditLog => "audit_log",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessControl;

impl AccessControl {
    /// Decide whether `caller` (`None` for anonymous) may perform `action` on `resource`.
    pub fn can_access(caller: Option<&Caller>, action: Action, resource: &Resource<'_>) -> bool {
        // Append-only: checked before any role so nobody can change history.
        if let Resource::AuditLog = resource {
            return match action {
                Action::Insert => caller.is_some(),
                Action::Read => caller.is_some_and(|c| c.is_admin),
                Action::Update | Action::Delete => false,
            };
        }

        let Some(caller) = caller else {
            return action == Action::Read && matches!(resource, Resource::Dojo | Resource::Config);
        };

        match (action, resource) {
            // Self-scope
            (Action::Read | Action::Insert | Action::Update, Resource::Coach { id })
                if *id == caller.user_id =>
            {
                true
            }
            // Tenant ownership
            (_, Resource::Athlete { coach_id }) if *coach_id == caller.user_id => true,
            // Admin override
            (Action::Read, _) if caller.is_admin => true,
            (_, Resource::Dojo | Resource::Config | Resource::AllowedEmail { .. })
                if caller.is_admin && action.is_write() =>
            {
                true
            }
            (Action::Update | Action::Delete, Resource::Athlete { .. }) if caller.is_admin => true,
            // Public read
            (Action::Read, Resource::Dojo | Resource::Config) => true,
            // Onboarding may create a dojo
            (Action::Insert, Resource::Dojo) => true,
            (Action::Read, Resource::AllowedEmail { email }) => {
                email.eq_ignore_ascii_case(&caller.email)
            }
            _ => false,
        }
    }

    /// [`Self::can_access`], failing with `Forbidden`.
    pub fn authorize(
        caller: Option<&Caller>,
        action: Action,
        resource: &Resource<'_>,
    ) -> Result<(), RegistrationError> {
        let allowed = Self::can_access(caller, action, resource);

        ACCESS_DECISIONS_TOTAL
            .with_label_values(&[
                resource.kind(),
                action.as_str(),
                if allowed { "allow" } else { "deny" },
            ])
            .inc();

        if allowed {
            Ok(())
        } else {
            warn!(
                user_id = ?caller.map(|c| c.user_id),
                action = action.as_str(),
                resource = resource.kind(),
                "Access denied"
            );
            Err(RegistrationError::forbidden(format!(
                "Not allowed to {} this {}",
                action.as_str(),
                resource.kind().replace('_', " ")
            )))
        }
    }

    /// Athlete rows `caller` may list.
    pub fn athlete_scope(caller: &Caller) -> AthleteScope {
        if caller.is_admin {
            AthleteScope::All
        } else {
            AthleteScope::Coach(caller.user_id)
        }
    }
}
