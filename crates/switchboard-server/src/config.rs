//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use switchboard_mux::MuxConfig;
use switchboard_settings::SwitchboardSettings;

/// Configuration for the switchboard server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind; `0` lets the OS pick.
    pub port: u16,
    /// Directory holding `client.html` and `client.js`.
    pub static_dir: PathBuf,
    /// Max inbound websocket message size in bytes.
    pub max_message_bytes: usize,
    /// How long shutdown waits for the server tasks.
    pub shutdown_timeout: Duration,
    /// Coordinator tuning.
    pub mux: MuxConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&SwitchboardSettings::default())
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &SwitchboardSettings) -> Self {
        let mux = &settings.mux;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            static_dir: PathBuf::from(&settings.server.static_dir),
            max_message_bytes: settings.server.max_message_bytes,
            shutdown_timeout: Duration::from_millis(settings.server.shutdown_timeout_ms),
            mux: MuxConfig {
                tick_interval: mux.tick_interval(),
                admission_capacity: mux.admission_capacity,
                max_sessions: mux.max_sessions,
                outbound_capacity: mux.outbound_capacity,
                read_timeout: mux.read_timeout(),
                write_timeout: mux.write_timeout(),
                heartbeat_interval: mux.heartbeat_interval(),
                event_capacity: mux.event_capacity,
            },
        }
    }

    /// `host:port` string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_settings() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.static_dir, PathBuf::from("www"));
        assert_eq!(cfg.max_message_bytes, 64 * 1024);
        assert_eq!(cfg.mux, MuxConfig::default());
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 9090,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr(), "0.0.0.0:9090");
    }

    #[test]
    fn zero_timeouts_disable_read_deadline_and_heartbeat() {
        let mut settings = SwitchboardSettings::default();
        settings.mux.read_timeout_ms = 0;
        settings.mux.heartbeat_ms = 0;
        settings.mux.max_sessions = 3;
        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.mux.read_timeout, None);
        assert_eq!(cfg.mux.heartbeat_interval, None);
        assert_eq!(cfg.mux.max_sessions, 3);
    }
}
