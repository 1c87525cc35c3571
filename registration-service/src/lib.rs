pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    Json, Router,
    extract::FromRef,
    http::{HeaderName, HeaderValue, Method, Request, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post, put},
};
use service_core::middleware::{
    rate_limit::{IpRateLimiter, create_ip_rate_limiter, ip_rate_limit_middleware},
    security_headers::security_headers_middleware,
    tracing::{REQUEST_ID_HEADER, request_id_middleware},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::RegistrationConfig;
use crate::services::{
    AthleteRegistry, AuditLogger, CoachProfiles, ConfigGate, DojoDirectory, IdentityGate,
    IdentityVerifier, RegistrationStore, SessionGate, Whitelist,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::health::metrics,
        handlers::session::sign_in,
        handlers::coaches::complete_onboarding,
        handlers::coaches::get_me,
        handlers::coaches::update_me,
        handlers::coaches::list_coaches,
        handlers::dojos::list_dojos,
        handlers::dojos::create_dojo,
        handlers::dojos::rename_dojo,
        handlers::dojos::delete_dojo,
        handlers::athletes::list_athletes,
        handlers::athletes::register_athlete,
        handlers::athletes::bulk_register,
        handlers::athletes::athlete_stats,
        handlers::athletes::get_athlete,
        handlers::athletes::update_athlete,
        handlers::athletes::delete_athlete,
        handlers::audit::list_audit_logs,
        handlers::audit::audit_summary,
        handlers::audit::verify_audit_chain,
        handlers::config::list_config,
        handlers::config::registration_status,
        handlers::config::get_config,
        handlers::config::set_config,
        handlers::allowed_emails::list_allowed_emails,
        handlers::allowed_emails::add_allowed_email,
        handlers::allowed_emails::set_admin_flag,
        handlers::allowed_emails::remove_allowed_email,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::FieldError,
            handlers::athletes::BulkRegisterRequest,
            services::BulkOutcome,
            services::BulkRejection,
            services::SessionInfo,
            models::Athlete,
            models::AthleteInput,
            models::AthletePatch,
            models::AthleteStats,
            models::Gender,
            models::BeltRank,
            models::CompetitionDay,
            models::Coach,
            models::OnboardingRequest,
            models::CoachPatch,
            models::Dojo,
            models::DojoName,
            models::AllowedEmail,
            models::NewAllowedEmail,
            models::AdminFlag,
            models::AuditAction,
            models::AuditLogEntry,
            models::AuditSummary,
            models::ChainVerification,
            models::ConfigEntry,
            models::ConfigValue,
            models::RegistrationStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Session", description = "Whitelist admission at sign-in"),
        (name = "Coaches", description = "Onboarding and coach profiles"),
        (name = "Dojos", description = "Dojo directory"),
        (name = "Athletes", description = "Tenant-scoped athlete roster"),
        (name = "Audit", description = "Hash-chained audit trail"),
        (name = "Config", description = "Tournament settings and the registration window"),
        (name = "Whitelist", description = "Access list management"),
        (name = "Health", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: RegistrationConfig,
    pub store: Arc<dyn RegistrationStore>,
    pub verifier: IdentityVerifier,
    pub identity: IdentityGate,
    pub sessions: SessionGate,
    pub coaches: CoachProfiles,
    pub dojos: DojoDirectory,
    pub athletes: AthleteRegistry,
    pub audit: AuditLogger,
    pub settings: ConfigGate,
    pub whitelist: Whitelist,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire every component onto one store.
    pub fn new(config: RegistrationConfig, store: Arc<dyn RegistrationStore>) -> Self {
        let identity = IdentityGate::new(store.clone());
        let settings = ConfigGate::new(store.clone());
        let audit = AuditLogger::new(store.clone());

        Self {
            verifier: IdentityVerifier::new(&config.identity),
            sessions: SessionGate::new(identity.clone(), store.clone()),
            coaches: CoachProfiles::new(identity.clone(), store.clone()),
            dojos: DojoDirectory::new(store.clone()),
            athletes: AthleteRegistry::new(store.clone(), settings.clone(), audit.clone()),
            whitelist: Whitelist::new(store.clone()),
            ip_rate_limiter: create_ip_rate_limiter(
                config.rate_limit.global_ip_limit,
                config.rate_limit.global_ip_window_seconds,
                config.rate_limit.trust_forwarded_for,
            ),
            identity,
            settings,
            audit,
            store,
            config,
        }
    }
}

impl FromRef<AppState> for IdentityGate {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    // Routes that need a verified identity token.
    let authenticated = Router::new()
        .route("/session", post(handlers::session::sign_in))
        .route("/dojos", post(handlers::dojos::create_dojo))
        .route(
            "/dojos/:id",
            patch(handlers::dojos::rename_dojo).delete(handlers::dojos::delete_dojo),
        )
        .route(
            "/coaches/me",
            get(handlers::coaches::get_me)
                .post(handlers::coaches::complete_onboarding)
                .patch(handlers::coaches::update_me),
        )
        .route("/coaches", get(handlers::coaches::list_coaches))
        .route(
            "/athletes",
            get(handlers::athletes::list_athletes).post(handlers::athletes::register_athlete),
        )
        .route("/athletes/bulk", post(handlers::athletes::bulk_register))
        .route("/athletes/stats", get(handlers::athletes::athlete_stats))
        .route(
            "/athletes/:id",
            get(handlers::athletes::get_athlete)
                .patch(handlers::athletes::update_athlete)
                .delete(handlers::athletes::delete_athlete),
        )
        .route("/audit-logs", get(handlers::audit::list_audit_logs))
        .route("/audit-logs/summary", get(handlers::audit::audit_summary))
        .route("/audit-logs/verify", get(handlers::audit::verify_audit_chain))
        .route("/config/:key", put(handlers::config::set_config))
        .route(
            "/allowed-emails",
            get(handlers::allowed_emails::list_allowed_emails)
                .post(handlers::allowed_emails::add_allowed_email),
        )
        .route(
            "/allowed-emails/:id",
            patch(handlers::allowed_emails::set_admin_flag)
                .delete(handlers::allowed_emails::remove_allowed_email),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut public = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::metrics))
        .route("/dojos", get(handlers::dojos::list_dojos))
        .route("/config", get(handlers::config::list_config))
        .route("/config/status", get(handlers::config::registration_status))
        .route("/config/:key", get(handlers::config::get_config));

    if state.config.swagger_enabled() {
        public =
            public.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // The document itself stays available for client generation.
        public = public.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let ip_limiter = state.ip_rate_limiter.clone();

    public
        .merge(authenticated)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(middleware::metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config))
}

fn cors_layer(config: &RegistrationConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}
