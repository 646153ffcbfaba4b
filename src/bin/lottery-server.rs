//! Lottery intake server entry point.
//!
//! Reads an optional YAML config from `LOTTERY_CONFIG`, applies environment
//! overrides and serves agencies until Ctrl+C or SIGTERM.

use std::path::PathBuf;

use anyhow::Context;
use lottery_intake::logging::init_logging;
use lottery_intake::{Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("LOTTERY_CONFIG").map(PathBuf::from);
    let config = ServerConfig::load(config_path.as_deref()).context("loading configuration")?;

    init_logging(&config.log_level, config.log_json)?;
    tracing::debug!(?config, "configuration loaded");

    let server = Server::builder(config)
        .bind()
        .await
        .context("starting server")?;

    let trigger = server.shutdown_trigger();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        trigger.trigger();
    });

    server.run().await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            tracing::warn!(error = %e, "cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
