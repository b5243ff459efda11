//! superchatd - multi-transport, multi-tenant chat and forum server.

use std::path::Path;

use superchatd::{Config, Server};
use tracing::{error, info};

/// Resolve the configuration path from CLI arguments.
/// Supports `-c <path>`, `--config <path>`, or a bare path.
/// Falls back to `config.toml` when no argument is provided.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    let raw_path = match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {}", flag);
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    };

    match std::fs::canonicalize(Path::new(&raw_path)) {
        Ok(p) => p.to_string_lossy().into_owned(),
        Err(_) => raw_path,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration first, so tracing can honor log_format.
    let config_path = resolve_config_path();
    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path).map_err(|e| {
            eprintln!("ERROR: Failed to load config from {}: {}", config_path, e);
            e
        })?
    } else {
        eprintln!("No config file at {config_path}; using built-in defaults");
        Config::default()
    };

    superchatd::telemetry::init(config.server.log_format);

    if let Err(errors) = config.validate() {
        for err in &errors {
            error!(error = %err, "Configuration validation failed");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    info!(
        name = %config.server.name,
        directory = config.directory.enabled,
        "Starting superchatd"
    );

    // Prometheus metrics are optional; metrics_port = 0 disables them.
    let metrics_port = config.server.metrics_port;
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        superchatd::metrics::init();
        tokio::spawn(async move {
            superchatd::http::run_http_server(metrics_port).await;
        });
    }

    let server = Server::start(config).await?;

    // Graceful shutdown on SIGINT/SIGTERM.
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT - initiating graceful shutdown"),
            _ = sigterm.recv() => info!("Received SIGTERM - initiating graceful shutdown"),
        }
    }

    server.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}
