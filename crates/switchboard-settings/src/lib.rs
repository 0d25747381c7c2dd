//! # switchboard-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SwitchboardSettings::default()`]
//! 2. **User file**: `~/.switchboard/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SWITCHBOARD_*` overrides (highest priority)
//!
//! ```no_run
//! use switchboard_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("listening on {}:{}", settings.server.host, settings.server.port);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_file_layer, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<SwitchboardSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// The first call loads from `~/.switchboard/settings.json` plus env
/// overrides, falling back to compiled defaults if loading fails.
pub fn get_settings() -> &'static SwitchboardSettings {
    SETTINGS.get_or_init(|| match load_settings() {
        Ok(settings) => settings,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load settings, using defaults");
            SwitchboardSettings::default()
        }
    })
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: SwitchboardSettings) -> std::result::Result<(), SwitchboardSettings> {
    SETTINGS.set(settings)
}
