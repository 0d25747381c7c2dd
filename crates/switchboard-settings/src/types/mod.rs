//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file only needs the fields it changes.

mod server;

pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9090 },
///   "mux": { "maxSessions": 64, "readTimeoutMs": 0 },
///   "logging": { "level": "debug", "json": false }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwitchboardSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    pub server: ServerSettings,
    pub mux: MuxSettings,
    pub logging: LoggingSettings,
}

impl Default for SwitchboardSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "switchboard".to_string(),
            server: ServerSettings::default(),
            mux: MuxSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl SwitchboardSettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, bool); 8] = [
            ("server.host must not be empty", self.server.host.trim().is_empty()),
            ("server.port must be non-zero", self.server.port == 0),
            (
                "server.maxMessageBytes must be at least 1",
                self.server.max_message_bytes == 0,
            ),
            ("mux.tickMs must be at least 1", self.mux.tick_ms == 0),
            (
                "mux.admissionCapacity must be at least 1",
                self.mux.admission_capacity == 0,
            ),
            ("mux.maxSessions must be at least 1", self.mux.max_sessions == 0),
            (
                "mux.outboundCapacity must be at least 1",
                self.mux.outbound_capacity == 0,
            ),
            ("mux.writeTimeoutMs must be at least 1", self.mux.write_timeout_ms == 0),
        ];
        match checks.iter().find(|(_, failed)| *failed) {
            Some((message, _)) => Err(SettingsError::InvalidValue((*message).to_string())),
            None => Ok(()),
        }
    }
}
