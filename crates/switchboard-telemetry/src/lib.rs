//! # switchboard-telemetry
//!
//! Installs the global `tracing` subscriber: an [`EnvFilter`] built from the
//! configured level and per-module overrides (`RUST_LOG` wins when set), and a
//! stdout formatting layer that writes either JSON lines or compact text.

#![deny(unsafe_code)]

use switchboard_settings::{LogLevel, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG`.
    pub level: LogLevel,
    /// Per-module level overrides (e.g. `switchboard_mux` => debug).
    pub module_levels: Vec<(String, LogLevel)>,
    /// JSON lines when true, compact text otherwise.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            module_levels: Vec::new(),
            json: true,
        }
    }
}

impl From<&LoggingSettings> for TelemetryConfig {
    fn from(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level,
            module_levels: settings
                .modules
                .iter()
                .map(|(module, level)| (module.clone(), *level))
                .collect(),
            json: settings.json,
        }
    }
}

impl TelemetryConfig {
    /// `EnvFilter` directive string, e.g. `info,switchboard_mux=debug`.
    pub fn filter_directives(&self) -> String {
        let mut directives = self.level.as_filter_str().to_string();
        for (module, level) in &self.module_levels {
            directives.push_str(&format!(",{module}={}", level.as_filter_str()));
        }
        directives
    }
}

/// Initialize the global subscriber. Call once at startup.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case this call changes nothing.
pub fn init_telemetry(config: &TelemetryConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .is_ok()
}
