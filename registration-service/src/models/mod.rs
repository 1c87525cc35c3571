pub mod allowed_email;
pub mod athlete;
pub mod audit_log;
pub mod coach;
pub mod config_entry;
pub mod dojo;

pub use allowed_email::{AdminFlag, AllowedEmail, NewAllowedEmail};
pub use athlete::{
    Athlete, AthleteFilter, AthleteInput, AthletePatch, AthleteScope, AthleteStats, BeltRank,
    CompetitionDay, Gender, NewAthlete,
};
pub use audit_log::{
    AuditAction, AuditFilter, AuditLogEntry, AuditSummary, ChainVerification, GENESIS_HASH,
};
pub use coach::{Coach, CoachPatch, OnboardingRequest};
pub use config_entry::{ConfigEntry, ConfigKey, ConfigValue, RegistrationStatus, TournamentDates};
pub use dojo::{Dojo, DojoName};
