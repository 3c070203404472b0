//! Binary entrypoint: load config, connect the bus, run the Gateway loop.
//!
//! Follows `server/src/main.rs` (trivial entrypoint delegating to an
//! `anyhow::Result` runner) and `server/src/app.rs::CoreApp::run`
//! (`dotenvy` then logging init before anything else).

mod config;
mod gateway_loop;
mod irc;
mod rate_limit;
mod token;

use std::sync::Arc;

use anyhow::Context;
use chat_bus::BusClient;
use tokio::sync::watch;

use config::{CredentialSource, GatewayConfig};
use token::TokenManager;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("twitch-gateway: fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = GatewayConfig::load()?;
    init_logging(&config.log_level);

    tracing::info!(nick = %config.nick, channels = ?config.channels, "starting twitch-gateway");

    let bus = Arc::new(
        BusClient::connect(&config.redis_url)
            .await
            .context("failed to connect to bus")?,
    );
    bus.ensure_group(&config.redis_stream_in, &config.redis_consumer_group)
        .await
        .context("failed to ensure IN consumer group")?;

    let token_manager = match &config.credential {
        CredentialSource::Static { .. } => None,
        CredentialSource::Managed {
            token_file,
            client_id,
            client_secret,
            min_ttl_sec,
        } => Some(Arc::new(TokenManager::new(
            token_file.clone().into(),
            client_id.clone(),
            client_secret.clone(),
            config.nick.clone(),
            *min_ttl_sec,
        ))),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(install_signal_handler(shutdown_tx));

    gateway_loop::run(config, token_manager, bus, shutdown_rx).await
}

/// Stop accepting new work on Ctrl+C/SIGTERM, mirroring
/// `core/shutdown.rs::install_signal_handlers`.
async fn install_signal_handler(tx: watch::Sender<bool>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler, watching Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("shutdown signal received, draining");
    let _ = tx.send(true);
}

fn init_logging(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter.to_string())
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_ansi(true)
        .compact()
        .init();
}
