//! # ecotrack-daemon
//!
//! EcoTrack realtime hub binary: loads settings, starts the HTTP/WebSocket
//! server, and waits for Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use ecotrack_core::logging::{LogFormat, init_subscriber};
use ecotrack_server::config::ServerConfig;
use ecotrack_server::metrics::install_recorder;
use ecotrack_server::server::EcotrackServer;
use ecotrack_settings::EcotrackSettings;

/// EcoTrack realtime hub.
#[derive(Parser, Debug)]
#[command(name = "ecotrack", about = "EcoTrack realtime broadcast hub")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter directive (overrides settings; `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,

    /// Log line format: `compact` or `json`.
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Command-line flags take precedence over file and env layers.
    fn apply(&self, settings: &mut EcotrackSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

fn load(args: &Cli) -> Result<EcotrackSettings> {
    let path = args
        .settings
        .clone()
        .unwrap_or_else(ecotrack_settings::settings_path);
    let mut settings = ecotrack_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    args.apply(&mut settings);
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load(&args)?;

    init_subscriber(&settings.logging.level, settings.logging.format);

    let metrics_handle = match install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let config = ServerConfig::from_settings(&settings);
    let server = EcotrackServer::new(config, metrics_handle);
    let (addr, serve_handle) = server
        .listen()
        .await
        .context("Failed to start server")?;

    tracing::info!("EcoTrack hub listening on http://{addr}");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.stop(None).await;
    let _ = serve_handle.await;

    Ok(())
}
