//! pos-device-hub server entry point.
//!
//! Starts the Axum HTTP server with the REST endpoints, the event stream and
//! the background device pollers.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use pos_device_hub::api;
use pos_device_hub::app_state::AppState;
use pos_device_hub::config::HubConfig;
use pos_device_hub::device::{DeviceManager, PrinterSupervisor, SerialPrinterManager};
use pos_device_hub::domain::DeviceCoordinator;
use pos_device_hub::service::ports::{LogTelemetry, NoPendingTransactions};
use pos_device_hub::service::{
    InMemoryDomain, OperationRegistry, PollerDeps, TefService, TillLedger, spawn_pollers,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = HubConfig::from_env().context("invalid configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    tracing::info!(addr = %config.listen_addr, "starting pos-device-hub");

    if config.stations.is_empty() {
        tracing::warn!("STATION_TOKENS is empty, no station can connect");
    }

    // Build device layer
    let devices: Arc<dyn DeviceManager> = Arc::new(SerialPrinterManager::new(config.printer.clone()));
    let supervisor = Arc::new(PrinterSupervisor::new(devices, config.printer_retry_delay));
    let coordinator = Arc::new(DeviceCoordinator::new());

    // Build service layer
    let domain = Arc::new(InMemoryDomain::new(config.stations.clone()));
    for station in domain.stations() {
        tracing::info!(station = %station.id, name = %station.name, "station registered");
    }
    let registry = Arc::new(OperationRegistry::new());
    if registry.names().is_empty() {
        tracing::warn!("no tef operation handlers registered");
    }
    let tef = Arc::new(TefService::new(
        Arc::clone(&coordinator),
        Arc::clone(&supervisor),
        registry,
        Arc::clone(&domain) as Arc<dyn TillLedger>,
        config.tef_settings(),
    ));

    // Start pollers
    match config.poller_settings() {
        Some(settings) => {
            spawn_pollers(
                &settings,
                PollerDeps {
                    coordinator: Arc::clone(&coordinator),
                    supervisor: Arc::clone(&supervisor),
                    tills: Arc::clone(&domain) as Arc<dyn TillLedger>,
                    sat: None,
                    pinpad: None,
                    telemetry: Arc::new(LogTelemetry),
                },
            );
        }
        None => tracing::warn!("no station configured, pollers not started"),
    }

    // Build application state
    let app_state = AppState {
        coordinator,
        supervisor,
        tef,
        stations: domain,
        pending: Arc::new(NoPendingTransactions),
        sat_check: None,
        pinpad_check: None,
        printer_retries: config.printer_retries,
    };

    // Start server
    let app = api::build_app(app_state);
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
