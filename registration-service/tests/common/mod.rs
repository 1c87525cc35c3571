//! Common test utilities for registration-service integration tests.
#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use registration_service::{
    AppState, build_router,
    config::{
        Environment, IdentityConfig, RateLimitConfig, RegistrationConfig, SecurityConfig,
        StoreBackend, StoreConfig, SwaggerConfig, TournamentSettings,
    },
    models::{AllowedEmail, AthleteInput, Coach, ConfigEntry, DojoName, OnboardingRequest},
    services::{Caller, Identity, IdentityClaims, MemoryStore, RegistrationStore},
};
use serde_json::{Value, json};
use service_core::config::Config as CommonConfig;
use std::sync::{Arc, Once};
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "registration-test-secret-at-least-32-bytes";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,registration_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn test_config(backend: StoreBackend, database_url: String) -> RegistrationConfig {
    RegistrationConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        environment: Environment::Dev,
        service_name: "registration-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store: StoreConfig {
            backend,
            database_url,
            max_connections: 4,
            min_connections: 1,
        },
        identity: IdentityConfig {
            jwt_secret: JWT_SECRET.to_string(),
            issuer: None,
            audience: None,
        },
        bootstrap_admin_email: None,
        tournament: TournamentSettings::default(),
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
            trust_forwarded_for: false,
        },
        swagger: SwaggerConfig { enabled: false },
    }
}

/// A user as the identity provider knows them.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
}

impl TestUser {
    pub fn new(email: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id,
            email: self.email.clone(),
        }
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<dyn RegistrationStore>,
    pub router: Router,
}

impl TestApp {
    /// Fresh in-memory application with default tournament settings seeded.
    pub async fn spawn() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), StoreBackend::Memory, String::new()).await
    }

    pub async fn with_store(
        store: Arc<dyn RegistrationStore>,
        backend: StoreBackend,
        database_url: String,
    ) -> Self {
        init_tracing();

        let state = AppState::new(test_config(backend, database_url), store.clone());
        state
            .settings
            .seed(&TournamentSettings::default())
            .await
            .expect("Failed to seed configuration");
        let router = build_router(state.clone());

        Self {
            state,
            store,
            router,
        }
    }

    /// Put `email` on the whitelist. Already listed emails keep their row.
    pub async fn whitelist(&self, email: &str, is_admin: bool) {
        let entry = AllowedEmail {
            id: Uuid::new_v4(),
            email: email.to_lowercase(),
            is_admin,
            added_by: None,
            created_at: Utc::now(),
        };
        let mut tx = self.store.begin().await.expect("begin");
        tx.seed_allowed_email(&entry)
            .await
            .expect("Failed to whitelist email");
        tx.commit().await.expect("commit");
    }

    pub async fn caller(&self, user: &TestUser) -> Caller {
        self.state
            .identity
            .admit(&user.identity())
            .await
            .expect("User should be whitelisted")
    }

    /// Whitelist, create the dojo if needed, and complete onboarding.
    pub async fn onboard(&self, user: &TestUser, is_admin: bool, dojo: &str) -> Coach {
        self.whitelist(&user.email, is_admin).await;
        let caller = self.caller(user).await;

        let existing = self
            .store
            .list_dojos()
            .await
            .expect("list dojos")
            .into_iter()
            .find(|d| d.name == dojo);
        let dojo_id = match existing {
            Some(d) => d.id,
            None => {
                self.state
                    .dojos
                    .create(
                        &caller,
                        DojoName {
                            name: dojo.to_string(),
                        },
                    )
                    .await
                    .expect("Failed to create dojo")
                    .id
            }
        };

        self.state
            .coaches
            .complete_onboarding(
                &user.identity(),
                OnboardingRequest {
                    full_name: format!("Coach {}", &user.email[..user.email.find('@').unwrap_or(0)]),
                    phone: None,
                    dojo_id,
                },
            )
            .await
            .expect("Failed to onboard")
    }

    /// Move the deadline into the past while leaving `registration_open` set.
    pub async fn close_registration(&self) {
        self.write_config(
            "registration_deadline",
            json!((Utc::now() - Duration::hours(1)).to_rfc3339()),
        )
        .await;
    }

    pub async fn write_config(&self, key: &str, value: Value) {
        let entry = ConfigEntry {
            key: key.to_string(),
            value,
            updated_at: Utc::now(),
            updated_by: None,
        };
        let mut tx = self.store.begin().await.expect("begin");
        assert!(
            tx.update_config(&entry).await.expect("update config"),
            "config key {} is not seeded",
            key
        );
        tx.commit().await.expect("commit");
    }

    pub fn token(&self, user: &TestUser) -> String {
        sign_token(user, JWT_SECRET)
    }

    /// Send one request through the full router and decode the JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }
}

pub fn sign_token(user: &TestUser, secret: &str) -> String {
    let claims = IdentityClaims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        exp: (Utc::now() + Duration::minutes(10)).timestamp(),
        iss: None,
        aud: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign token")
}

pub fn athlete_input(full_name: &str, date_of_birth: &str) -> AthleteInput {
    AthleteInput {
        full_name: full_name.to_string(),
        date_of_birth: date_of_birth.to_string(),
        gender: "Female".to_string(),
        belt_rank: "Green".to_string(),
        weight_kg: Some(42.5),
        competition_day: "Day 1".to_string(),
        kata_event: true,
        kumite_event: false,
    }
}
