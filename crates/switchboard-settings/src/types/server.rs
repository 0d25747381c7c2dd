//! Server, multiplexer, and logging settings.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP / websocket listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Directory holding `client.html` and `client.js`.
    pub static_dir: String,
    /// Largest inbound websocket message accepted, in bytes.
    pub max_message_bytes: usize,
    /// How long to wait for tasks to finish on shutdown, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            static_dir: "www".to_string(),
            max_message_bytes: 64 * 1024,
            shutdown_timeout_ms: 10_000,
        }
    }
}

/// Session multiplexer tuning.
///
/// Timeouts set to `0` are disabled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MuxSettings {
    /// Longest idle wait between coordinator ticks.
    pub tick_ms: u64,
    /// Accepted connections that may wait for admission.
    pub admission_capacity: usize,
    /// Maximum live sessions.
    pub max_sessions: usize,
    /// Unsent replies a session may hold before it is closed.
    pub outbound_capacity: usize,
    /// Read deadline per message.
    pub read_timeout_ms: u64,
    /// Write deadline per message.
    pub write_timeout_ms: u64,
    /// Interval between websocket pings.
    pub heartbeat_ms: u64,
    /// Session events buffered per subscriber.
    pub event_capacity: usize,
}

impl Default for MuxSettings {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            admission_capacity: 10,
            max_sessions: 256,
            outbound_capacity: 64,
            read_timeout_ms: 60_000,
            write_timeout_ms: 5_000,
            heartbeat_ms: 30_000,
            event_capacity: 256,
        }
    }
}

impl MuxSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        non_zero_millis(self.heartbeat_ms)
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Log severity level.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    /// Least verbose.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Parse a level name, case-insensitively. `warning` is accepted for `warn`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` takes precedence when set.
    pub level: LogLevel,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Per-target level overrides, e.g. `{"switchboard_mux": "debug"}`.
    pub modules: BTreeMap<String, LogLevel>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: true,
            modules: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let server = ServerSettings::default();
        assert_eq!(server.host, "127.0.0.1");
        assert_eq!(server.port, 8080);
        assert_eq!(server.static_dir, "www");
        assert_eq!(server.max_message_bytes, 65_536);
    }

    #[test]
    fn mux_defaults_and_durations() {
        let mux = MuxSettings::default();
        assert_eq!(mux.tick_interval(), Duration::from_millis(10));
        assert_eq!(mux.admission_capacity, 10);
        assert_eq!(mux.max_sessions, 256);
        assert_eq!(mux.read_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(mux.write_timeout(), Duration::from_secs(5));
        assert_eq!(mux.heartbeat_interval(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn zero_timeouts_disable() {
        let mux = MuxSettings {
            read_timeout_ms: 0,
            heartbeat_ms: 0,
            ..MuxSettings::default()
        };
        assert_eq!(mux.read_timeout(), None);
        assert_eq!(mux.heartbeat_interval(), None);
    }

    #[test]
    fn mux_serde_camel_case() {
        let json = serde_json::to_value(MuxSettings::default()).unwrap();
        assert_eq!(json["maxSessions"], 256);
        assert_eq!(json["readTimeoutMs"], 60_000);
        assert!(json.get("max_sessions").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let server: ServerSettings = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(server.port, 9000);
        assert_eq!(server.host, "127.0.0.1");
    }

    #[test]
    fn log_level_parse_and_filter() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!(LogLevel::Error.as_filter_str(), "error");
    }

    #[test]
    fn logging_modules_roundtrip_lowercase() {
        let json = r#"{"level": "warn", "json": false, "modules": {"switchboard_mux": "trace"}}"#;
        let logging: LoggingSettings = serde_json::from_str(json).unwrap();
        assert_eq!(logging.level, LogLevel::Warn);
        assert!(!logging.json);
        assert_eq!(logging.modules["switchboard_mux"], LogLevel::Trace);
    }
}
