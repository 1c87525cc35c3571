//! Services layer for registration-service.
//!
//! Admission, access rules, the athlete registry with its audit trail, global
//! settings, and the storage backends they run on.

pub mod access;
pub mod audit;
pub mod config_gate;
mod database;
pub mod directory;
pub mod error;
pub mod identity;
mod jwt;
mod memory;
pub mod metrics;
pub mod profiles;
pub mod registry;
pub mod store;
pub mod whitelist;

pub use access::{AccessControl, Action, Resource};
pub use audit::AuditLogger;
pub use config_gate::ConfigGate;
pub use database::PgStore;
pub use directory::DojoDirectory;
pub use error::{RegistrationError, StoreError};
pub use identity::{Caller, Identity, IdentityGate, Verdict};
pub use jwt::{IdentityClaims, IdentityVerifier};
pub use memory::MemoryStore;
pub use profiles::{CoachProfiles, SessionGate, SessionInfo};
pub use registry::{AthleteRegistry, BulkOutcome, BulkRejection};
pub use store::{RegistrationStore, StoreTx};
pub use whitelist::{Whitelist, bootstrap_admin};
