mod api;
mod config;
mod mirror;
mod retention;
mod scheduler;
mod sensors;
mod storage;
mod switchbot;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::api::handlers::AppState;
use crate::config::Config;
use crate::mirror::{MirrorSink, SheetsMirror};
use crate::retention::RetentionSweeper;
use crate::scheduler::Scheduler;
use crate::sensors::SensorService;
use crate::storage::{create_storage, Reading, StorageBackend};
use crate::switchbot::SwitchBotClient;

#[derive(Parser)]
#[command(name = "switchbot-logger", about = "SwitchBot Hub 2 temperature logger", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch one reading and persist it (best-effort; always exits 0)
    Once,
    /// Test API connectivity and log the current reading
    Test,
    /// Delete readings older than the retention window
    Cleanup,
    /// List registered devices
    Devices,
    /// Test spreadsheet mirror connectivity with a sample row
    TestSheets,
    /// Run the polling loop and the HTTP trigger endpoint
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present; env vars may also be set externally.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Once => run_once(&config).await,
        Command::Test => run_test(&config).await,
        Command::Cleanup => run_cleanup(&config).await,
        Command::Devices => run_devices(&config).await,
        Command::TestSheets => run_test_sheets(&config).await,
        Command::Serve => run_serve(config).await,
    }
}

fn build_client(config: &Config) -> Result<(SwitchBotClient, String)> {
    let creds = config.api_credentials()?;
    let client = SwitchBotClient::new(
        &config.api_base_url,
        &creds.token,
        &creds.secret,
        config.max_retries,
    );
    Ok((client, creds.device_id))
}

fn build_mirror(config: &Config) -> Option<SheetsMirror> {
    config
        .sheets
        .as_ref()
        .map(|s| SheetsMirror::new(&s.spreadsheet_id, &s.access_token))
}

async fn open_storage(config: &Config) -> Result<Box<dyn StorageBackend>> {
    create_storage(&config.storage_backend, config.storage_location()).await
}

/// Best-effort one-shot mode: a missing reading or failed save is logged but
/// does not change the exit code. Only configuration errors abort.
async fn run_once(config: &Config) -> Result<()> {
    let (client, device_id) = build_client(config)?;
    let service = SensorService::new(client);
    let storage = open_storage(config).await?;
    let mirror = build_mirror(config);

    service
        .fetch_and_persist(
            &device_id,
            storage.as_ref(),
            mirror.as_ref().map(|m| m as &dyn MirrorSink),
        )
        .await;
    Ok(())
}

async fn run_test(config: &Config) -> Result<()> {
    let (client, device_id) = build_client(config)?;
    let service = SensorService::new(client);

    info!("Testing API connection");
    match service.get_temperature_data(&device_id).await {
        Ok(Some(reading)) => {
            info!(
                temperature = ?reading.temperature,
                humidity = ?reading.humidity,
                light_level = ?reading.light_level,
                device_type = %reading.device_type,
                version = %reading.version,
                "API connection test succeeded"
            );
            Ok(())
        }
        Ok(None) => bail!("API connection test failed: device returned no data"),
        Err(e) => Err(e.context("API connection test failed")),
    }
}

async fn run_cleanup(config: &Config) -> Result<()> {
    let storage = open_storage(config).await?;
    let deleted = RetentionSweeper::new(config.retention_days)
        .sweep(storage.as_ref())
        .await;
    info!(deleted, "Cleanup finished");
    Ok(())
}

async fn run_devices(config: &Config) -> Result<()> {
    let (client, _) = build_client(config)?;
    let Some(list) = client.get_device_list().await? else {
        bail!("failed to fetch device list");
    };

    if !list.device_list.is_empty() {
        println!("\n[Physical devices]");
        for device in &list.device_list {
            println!("  name: {}", device.device_name.as_deref().unwrap_or("Unknown"));
            println!("  id:   {}", device.device_id.as_deref().unwrap_or("Unknown"));
            println!("  type: {}", device.device_type.as_deref().unwrap_or("Unknown"));
            if let Some(hub) = device.hub_device_id.as_deref().filter(|h| !h.is_empty()) {
                println!("  hub:  {hub}");
            }
            println!("  ---");
        }
    }

    if !list.infrared_remote_list.is_empty() {
        println!("\n[Infrared remote devices]");
        for remote in &list.infrared_remote_list {
            println!("  name: {}", remote.device_name.as_deref().unwrap_or("Unknown"));
            println!("  id:   {}", remote.device_id.as_deref().unwrap_or("Unknown"));
            println!("  type: {}", remote.remote_type.as_deref().unwrap_or("Unknown"));
            if let Some(hub) = remote.hub_device_id.as_deref().filter(|h| !h.is_empty()) {
                println!("  hub:  {hub}");
            }
            println!("  ---");
        }
    }

    println!("\nSet SWITCHBOT_DEVICE_ID to the id of the sensor you want to poll.");
    Ok(())
}

async fn run_test_sheets(config: &Config) -> Result<()> {
    let Some(mirror) = build_mirror(config) else {
        bail!("GOOGLE_SHEETS_SPREADSHEET_ID and GOOGLE_SHEETS_ACCESS_TOKEN must be set");
    };

    info!("Testing spreadsheet connection");
    mirror.connect().await?;

    let sample = Reading {
        timestamp: "2024-01-01T12:00:00".parse()?,
        device_id: "TEST_DEVICE".to_owned(),
        temperature: Some(25.0),
        humidity: Some(50.0),
        light_level: Some(100),
        device_type: "Test".to_owned(),
        version: "1.0.0".to_owned(),
    };
    mirror.append(&sample).await?;

    let rows = mirror.row_count().await?;
    info!(rows, "Test row written to spreadsheet");
    Ok(())
}

async fn run_serve(config: Config) -> Result<()> {
    let (client, device_id) = build_client(&config)?;
    let service = Arc::new(SensorService::new(client));
    let storage: Arc<dyn StorageBackend> = Arc::from(open_storage(&config).await?);
    let mirror: Option<Arc<dyn MirrorSink>> = build_mirror(&config)
        .map(|m| Arc::new(m) as Arc<dyn MirrorSink>);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler = Scheduler::new(
        service.clone(),
        storage.clone(),
        mirror.clone(),
        RetentionSweeper::new(config.retention_days),
        device_id.clone(),
        Duration::from_secs(config.poll_interval_secs),
        Duration::from_secs(config.cleanup_interval_secs),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let state = AppState {
        service,
        storage,
        mirror,
        device_id,
        retention_days: config.retention_days,
    };

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        })
        .await?;

    // Let an in-flight tick finish before exiting.
    let _ = scheduler_handle.await;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
