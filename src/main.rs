//! # switchboard
//!
//! Server binary: loads settings, installs logging and metrics, then runs the
//! websocket multiplexer until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use switchboard_core::MessageRouter;
use switchboard_server::{ServerConfig, SwitchboardServer};
use switchboard_settings::{LogLevel, SwitchboardSettings};
use switchboard_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{info, warn};

/// Websocket session multiplexer.
#[derive(Parser, Debug)]
#[command(name = "switchboard", about = "Websocket session multiplexer")]
struct Cli {
    /// Settings file (defaults to `~/.switchboard/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind.
    #[arg(long)]
    port: Option<u16>,

    /// Directory holding `client.html` and `client.js`.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn or error.
    #[arg(long, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,
}

fn parse_log_level(value: &str) -> std::result::Result<LogLevel, String> {
    LogLevel::parse(value).ok_or_else(|| format!("unknown log level '{value}'"))
}

impl Cli {
    fn apply(&self, settings: &mut SwitchboardSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = &self.static_dir {
            settings.server.static_dir = dir.to_string_lossy().into_owned();
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
    }
}

/// Settings file, then env overrides, then CLI flags.
fn load_settings(cli: &Cli) -> Result<SwitchboardSettings> {
    let path = match &cli.config {
        Some(path) if !path.exists() => bail!("settings file not found: {}", path.display()),
        Some(path) => path.clone(),
        None => switchboard_settings::settings_path(),
    };
    let mut settings = switchboard_settings::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings
        .validate()
        .context("invalid settings after command-line overrides")?;
    Ok(settings)
}

/// Fall back to the client bundled with the server crate when the default
/// relative directory is absent.
fn resolve_static_dir(configured: &Path) -> PathBuf {
    if configured.is_dir() {
        return configured.to_path_buf();
    }
    let default_dir = SwitchboardSettings::default().server.static_dir;
    let bundled = Path::new(env!("CARGO_MANIFEST_DIR")).join("crates/switchboard-server/www");
    if configured == Path::new(&default_dir) && bundled.is_dir() {
        info!(path = %bundled.display(), "using bundled static client");
        return bundled;
    }
    warn!(
        path = %configured.display(),
        "static directory not found, client requests will get 204"
    );
    configured.to_path_buf()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings first: the log level comes from them.
    let settings = load_settings(&cli)?;
    let _ = init_telemetry(&TelemetryConfig::from(&settings.logging));
    if switchboard_settings::init_settings(settings).is_err() {
        warn!("global settings were already initialized");
    }
    let settings = switchboard_settings::get_settings();

    let prometheus = switchboard_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;

    let mut config = ServerConfig::from_settings(settings);
    config.static_dir = resolve_static_dir(&config.static_dir);

    let running = SwitchboardServer::new(config, MessageRouter::default())
        .with_metrics(prometheus)
        .listen()
        .await
        .context("failed to start server")?;
    info!(
        "{} {} listening on ws://{}",
        settings.name,
        settings.version,
        running.local_addr()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("Shutting down...");
    running.stop().await;
    info!("Shutdown complete");
    Ok(())
}
