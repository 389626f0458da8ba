//! EDC poller binary.
//! Loads the TOML config, picks the sink, discovers or loads streams and polls
//! until Ctrl-C / SIGTERM.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use edc_poller::config::edc::{DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH};
use edc_poller::ingest::{scheduler, sink};
use edc_poller::metrics::Metrics;
use edc_poller::transport::{HttpTransport, Transport};
use edc_poller::{EdcConfig, Engine};

#[derive(Parser, Debug)]
#[command(author, version, about = "Polls EDC data collector streams into files or PostgreSQL.")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short = 'c', long = "config", env = ENV_CONFIG_PATH, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown requested");
    cancel.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    edc_poller::init_tracing();

    let cli = Cli::parse();
    info!(config = %cli.config.display(), "starting edc poller");

    let cfg = EdcConfig::load_from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))
        .inspect_err(|e| error!(error = %format!("{e:#}"), "invalid configuration"))?;
    info!(
        host = %cfg.account.host,
        storage = cfg.poll.storage.label(),
        format = cfg.poll.format.extension(),
        poll_interval = cfg.poll.poll_interval,
        poll_max = cfg.poll.poll_max,
        streams = cfg.streams.len(),
        "configuration loaded"
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let _metrics = match cfg.metrics_listen {
        Some(addr) => {
            let m = Metrics::init()?;
            m.serve(addr, cancel.clone()).await?;
            Some(m)
        }
        None => None,
    };

    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&cfg.account)?);
    let sink = sink::from_config(&cfg.poll).await?;
    info!(sink = sink.name(), "sink ready");

    let engine = Engine::from_config(&cfg, transport, sink, &cancel).await?;
    info!(streams = engine.registry().len(), "streams registered");

    scheduler::spawn(engine, cancel).await?;
    info!("exiting");
    Ok(())
}
