pub mod auth;
pub mod metrics;

pub use auth::{AuthUser, CurrentCaller, auth_middleware};
pub use metrics::metrics_middleware;
