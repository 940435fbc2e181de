//! TLS-terminating reverse proxy.
//!
//! Loads configuration, starts the worker threads, and waits for SIGINT or
//! SIGTERM before shutting them down.

use std::path::PathBuf;

use clap::Parser;

use tls_reverse_proxy::config::{load_config, validate_config, ConfigError, ProxyConfig};
use tls_reverse_proxy::lifecycle::{shutdown_on_signal, Supervisor};
use tls_reverse_proxy::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "tls-reverse-proxy", version, about = "TLS-terminating reverse proxy")]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of worker event loops.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(workers) = cli.workers {
        config.workers.count = workers;
    }
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tls-reverse-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        workers = config.workers.count,
        tls = config.listener.tls.is_some(),
        backends = config.backends.len(),
        cache = config.cache.enabled,
        timeout_secs = config.connection.timeout_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let supervisor = match Supervisor::start(&config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return Err(e.into());
        }
    };

    shutdown_on_signal(supervisor.shutdown_token()).await?;

    let failed = tokio::task::spawn_blocking(move || supervisor.join()).await?;
    if failed > 0 {
        tracing::warn!(failed, "Some workers exited with errors");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
