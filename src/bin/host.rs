//! Headless host binary for stdin/stdout JSON communication.
//!
//! Owns the update coordinator for the lifetime of the process, serves
//! `CommandEnvelope` lines from stdin, and writes `ResponseEnvelope` and
//! `EventEnvelope` lines to stdout.
//!
//! All tracing/diagnostic output goes to stderr so that stdout remains a
//! clean JSON protocol channel.

use anyhow::Context;
use shellkit::ShellConfig;
use shellkit::bridge::stdio::run_stdio_bridge;
use shellkit::config::UpdateConfig;
use shellkit::update::{
    BinaryInstaller, FeedUpdateClient, UnconfiguredClient, UpdateClient, UpdateCoordinator, prompt,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path = ShellConfig::default_config_path();
    let config = ShellConfig::load_or_default(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    tracing::info!(
        version = APP_VERSION,
        config = %config_path.display(),
        profile = ?config.update.build_profile,
        "shellkit-host starting"
    );

    let shutdown = CancellationToken::new();
    let client = build_update_client(&config.update, shutdown.clone())?;
    let coordinator = Arc::new(UpdateCoordinator::new(
        client,
        config.update.build_profile,
        prompt::for_preference(config.update.auto_download),
    ));

    if config.update.check_on_startup {
        coordinator.schedule_startup_check(
            Duration::from_millis(config.update.startup_delay_ms),
            shutdown.clone(),
        );
    }

    let result = run_stdio_bridge(
        Arc::clone(&coordinator),
        coordinator.windows(),
        &config.bridge,
        shutdown.clone(),
    )
    .await;

    // A cancelled token here means quit-and-install already applied the update.
    let installed = shutdown.is_cancelled();
    shutdown.cancel();
    if !installed && let Err(e) = coordinator.install_on_quit() {
        tracing::warn!(error = %e, "install on quit failed");
    }
    coordinator.unsubscribe();

    result.map_err(|e| {
        tracing::error!(error = %e, "shellkit-host exited with error");
        anyhow::anyhow!("shellkit-host failed: {e}")
    })?;

    tracing::info!("shellkit-host shut down cleanly");
    Ok(())
}

fn build_update_client(
    config: &UpdateConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<Arc<dyn UpdateClient>> {
    if config.feed_url.is_none() {
        tracing::info!("no update feed configured; updates disabled");
        return Ok(Arc::new(UnconfiguredClient::new(APP_VERSION)));
    }

    let installer = BinaryInstaller::for_current_exe()?;
    let client = FeedUpdateClient::from_config(config, APP_VERSION, Arc::new(installer), shutdown)?;
    Ok(Arc::new(client))
}
