//! Watchdock agent binary
//!
//! Loads the monitor config, schedules the monitoring cycle and runs until
//! interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use watchdock_agent::execution::SystemCommandRunner;
use watchdock_agent::metrics::disk::{DiskInfoProbe, Platform};
use watchdock_agent::{
    ApplicationIdentity, CronScheduler, MonitorConfig, MonitorEngine, SysinfoProbe,
};

const DISK_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("watchdock_agent=info")),
        )
        .init();

    info!("Watchdock agent starting...");

    let mut config = MonitorConfig::load().await.context("Failed to load config")?;
    if config.application.is_none() {
        let name = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "watchdock".to_string());
        config.application = Some(ApplicationIdentity::new(name));
    }

    let runner = Arc::new(SystemCommandRunner::with_timeout(DISK_COMMAND_TIMEOUT));
    let probe = SysinfoProbe::new(DiskInfoProbe::new(Platform::current(), runner));

    let engine = Arc::new(
        MonitorEngine::new(config)
            .context("Failed to build notification channels")?
            .with_probe(Arc::new(probe)),
    );

    let mut scheduler = CronScheduler::new().await?;
    engine.start(&scheduler).await.context("Failed to schedule monitoring")?;
    scheduler.start().await?;

    // First report right away rather than waiting for the first tick
    engine.tick().await;

    tokio::signal::ctrl_c().await.context("Failed to listen for shutdown")?;
    info!("Shutting down");
    scheduler.shutdown().await?;
    Ok(())
}
