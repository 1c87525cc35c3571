use chrono::{DateTime, Utc};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store: StoreConfig,
    pub identity: IdentityConfig,
    pub bootstrap_admin_email: Option<String>,
    pub tournament: TournamentSettings,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub swagger: SwaggerConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Verification settings for bearer tokens from the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub jwt_secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

/// Defaults written to the `config` table on first start.
#[derive(Debug, Clone, Deserialize)]
pub struct TournamentSettings {
    pub name: String,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub day1: String,
    pub day2: String,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            name: "Karate Championship".to_string(),
            registration_deadline: None,
            day1: String::new(),
            day2: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
    /// Key the limiter on `x-forwarded-for`. Enable only behind a proxy that sets it.
    pub trust_forwarded_for: bool,
}

/// Swagger UI is always served in dev. In prod only when enabled.
#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: bool,
}

impl RegistrationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let backend: StoreBackend = get_env("STORE_BACKEND", Some("postgres"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let config = RegistrationConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("registration-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            store: StoreConfig {
                backend,
                database_url: match backend {
                    StoreBackend::Postgres => get_env("DATABASE_URL", None, is_prod)?,
                    StoreBackend::Memory => get_optional_env("DATABASE_URL").unwrap_or_default(),
                },
                max_connections: get_env("DATABASE_MAX_CONNECTIONS", Some("10"), is_prod)?
                    .parse()
                    .unwrap_or(10),
                min_connections: get_env("DATABASE_MIN_CONNECTIONS", Some("1"), is_prod)?
                    .parse()
                    .unwrap_or(1),
            },
            identity: IdentityConfig {
                jwt_secret: get_env("IDENTITY_JWT_SECRET", None, is_prod)?,
                issuer: get_optional_env("IDENTITY_JWT_ISSUER"),
                audience: get_optional_env("IDENTITY_JWT_AUDIENCE"),
            },
            bootstrap_admin_email: get_optional_env("BOOTSTRAP_ADMIN_EMAIL"),
            tournament: TournamentSettings {
                name: get_optional_env("TOURNAMENT_NAME")
                    .unwrap_or_else(|| TournamentSettings::default().name),
                registration_deadline: get_optional_env("REGISTRATION_DEADLINE")
                    .map(|raw| {
                        DateTime::parse_from_rfc3339(&raw)
                            .map(|d| d.with_timezone(&Utc))
                            .map_err(|e| {
                                AppError::ConfigError(anyhow::anyhow!(
                                    "REGISTRATION_DEADLINE must be RFC 3339: {}",
                                    e
                                ))
                            })
                    })
                    .transpose()?,
                day1: get_optional_env("TOURNAMENT_DAY1").unwrap_or_default(),
                day2: get_optional_env("TOURNAMENT_DAY2").unwrap_or_default(),
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            rate_limit: RateLimitConfig {
                global_ip_limit: get_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?
                    .parse()
                    .unwrap_or(100),
                global_ip_window_seconds: get_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?
                .parse()
                .unwrap_or(60),
                trust_forwarded_for: get_optional_env("RATE_LIMIT_TRUST_FORWARDED_FOR")
                    .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            },
            swagger: SwaggerConfig {
                enabled: get_optional_env("ENABLE_SWAGGER")
                    .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.identity.jwt_secret.len() < 32 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "IDENTITY_JWT_SECRET must be at least 32 bytes"
            )));
        }

        if self.store.min_connections > self.store.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS cannot exceed DATABASE_MAX_CONNECTIONS"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.store.backend == StoreBackend::Memory {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "The in-memory store is not allowed in production"
                )));
            }
        }

        Ok(())
    }

    pub fn swagger_enabled(&self) -> bool {
        match self.environment {
            Environment::Dev => true,
            Environment::Prod => self.swagger.enabled,
        }
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}
