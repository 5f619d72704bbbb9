//! Layered configuration loading for audiowarden.
//!
//! The daemon re-reads its configuration on every endpoint-change event, so
//! loading is kept cheap and free of side effects: discover files, merge
//! their tables, deserialize once, apply environment overrides.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/audiowarden/config.toml` (system)
//! 2. `~/.config/audiowarden/config.toml` (user)
//! 3. `./audiowarden.toml` (local override, replaced by `--config`)
//! 4. Environment variables (`AUDIOWARDEN_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [pair]
//! hijacker = "bluez_output.00_11_22_33_44_55.1"
//! safe_target = "alsa_output.usb-FiiO_DAC.analog-stereo"
//!
//! [enforcement]
//! danger_window_ms = 60000
//! spike_threshold = 20
//! clamp_duration_ms = 10000
//! clamp_interval_ms = 10
//!
//! [telemetry]
//! log_level = "info"
//! log_buffer_bytes = 10000
//!
//! [pulse]
//! max_volume = 100
//! ```

pub mod loader;
pub mod pair;
pub mod tuning;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use pair::PairConfig;
pub use tuning::{EnforcementConfig, PulseConfig, TelemetryConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Complete audiowarden configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub pair: PairConfig,

    #[serde(default)]
    pub enforcement: EnforcementConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub pulse: PulseConfig,
}

impl WardenConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an explicit file replacing the local override.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut table = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let file_table = loader::load_from_file(&path)?;
            table = loader::merge_tables(table, file_table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::table_to_config(table, &origin)?;

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// True when both endpoints of the pair are set.
    pub fn is_configured(&self) -> bool {
        self.pair.is_configured()
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# audiowarden configuration\n\n");

        output.push_str("[pair]\n");
        output.push_str(&format!("hijacker = {:?}\n", self.pair.hijacker));
        output.push_str(&format!("safe_target = {:?}\n", self.pair.safe_target));

        output.push_str("\n[enforcement]\n");
        output.push_str(&format!(
            "danger_window_ms = {}\n",
            self.enforcement.danger_window_ms
        ));
        output.push_str(&format!(
            "spike_threshold = {}\n",
            self.enforcement.spike_threshold
        ));
        output.push_str(&format!(
            "clamp_duration_ms = {}\n",
            self.enforcement.clamp_duration_ms
        ));
        output.push_str(&format!(
            "clamp_interval_ms = {}\n",
            self.enforcement.clamp_interval_ms
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = {:?}\n", self.telemetry.log_level));
        output.push_str(&format!(
            "log_buffer_bytes = {}\n",
            self.telemetry.log_buffer_bytes
        ));

        output.push_str("\n[pulse]\n");
        output.push_str(&format!("max_volume = {}\n", self.pulse.max_volume));
        output.push_str(&format!("pactl = {:?}\n", self.pulse.pactl));

        output
    }
}
