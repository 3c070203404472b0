//! Binary entrypoint: load config, connect the bus, run the Brain loop.
//!
//! Mirrors `twitch-gateway`'s `main.rs` — `dotenvy` then logging init before
//! anything else, a `watch` channel fed by a signal handler for graceful
//! shutdown.

mod brain_loop;
mod config;
mod filters;
mod generator;
mod policy;
mod session_buffer;
mod summarizer;

use std::sync::Arc;

use anyhow::Context;
use chat_bus::BusClient;
use tokio::sync::watch;

use config::BrainConfig;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("chat-brain: fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = BrainConfig::load()?;
    init_logging(&config.log_level);

    tracing::info!(
        bot_nick = %config.bot_nick,
        channels = ?config.channel_allowlist,
        llm = config.ollama.is_some(),
        "starting chat-brain"
    );

    let bus = Arc::new(
        BusClient::connect(&config.redis_url)
            .await
            .context("failed to connect to bus")?,
    );
    bus.ensure_group(&config.redis_stream_in, &config.redis_consumer_group)
        .await
        .context("failed to ensure IN consumer group")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(install_signal_handler(shutdown_tx));

    brain_loop::run(config, bus, shutdown_rx).await
}

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
