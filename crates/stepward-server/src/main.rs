//! stepward server: application entry point.

mod config;
mod routes;

use std::error::Error;

use stepward_db::DbManager;
use stepward_db::repository::{SurrealAuditEventRepository, SurrealCertificateRepository};
use stepward_pki::{ConfiguredInspector, LifecycleService, StepCliAuthority};
use surrealdb::engine::remote::ws::Client;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::routes::{AppState, Backend, CaSettings};

/// step CLI in front of a SurrealDB store.
struct StepBackend;

impl Backend for StepBackend {
    type Authority = StepCliAuthority<ConfiguredInspector>;
    type Certificates = SurrealCertificateRepository<Client>;
    type Audit = SurrealAuditEventRepository<Client>;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("stepward=info".parse()?))
        .json()
        .init();

    info!("Starting stepward server...");

    let config = ServerConfig::from_env()?;

    let db = DbManager::open(&config.db).await?;

    let inspector = ConfiguredInspector::from_config(&config.ca);
    let authority = StepCliAuthority::new(config.ca.clone(), inspector)?;
    info!(
        ca_url = %config.ca.ca_url,
        provisioner = %config.ca.provisioner_name,
        inspector = ?config.ca.inspector,
        "CA agent configured"
    );

    let service = LifecycleService::new(
        authority,
        db.certificates(),
        db.audit_events(),
        config.lifecycle.clone(),
    );
    let state = AppState::<StepBackend>::new(service, CaSettings::from_config(&config.ca));
    let app = routes::router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("stepward server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
