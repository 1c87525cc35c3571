use registration_service::{
    AppState, build_router,
    config::{RegistrationConfig, StoreBackend},
    services::{MemoryStore, PgStore, RegistrationStore, bootstrap_admin},
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = RegistrationConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    registration_service::services::metrics::init_metrics();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        backend = ?config.store.backend,
        "Starting registration service"
    );

    let store: Arc<dyn RegistrationStore> = match config.store.backend {
        StoreBackend::Postgres => {
            let db = PgStore::connect(
                &config.store.database_url,
                config.store.max_connections,
                config.store.min_connections,
            )
            .await
            .map_err(|e| AppError::DatabaseError(e.into()))?;
            db.run_migrations()
                .await
                .map_err(|e| AppError::DatabaseError(e.into()))?;
            tracing::info!("Database initialized successfully");
            Arc::new(db)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    if let Some(email) = &config.bootstrap_admin_email {
        bootstrap_admin(store.as_ref(), email).await?;
    }

    let state = AppState::new(config.clone(), store);
    state.settings.seed(&config.tournament).await?;

    let app = build_router(state);

    let addr: SocketAddr = config
        .common
        .address()
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid listen address: {}", e)))?;

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
