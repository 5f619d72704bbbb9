//! Tunables - timing constants, thresholds and adapter settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Enforcement timing and thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementConfig {
    /// How long after a hijack a volume jump is presumed adversarial.
    /// Default: 60000 (60s)
    #[serde(default = "EnforcementConfig::default_danger_window_ms")]
    pub danger_window_ms: u64,

    /// Rise above the baseline that counts as a spike, in the adapter's
    /// volume unit (percent for `pactl`, see `[pulse] max_volume`).
    /// Default: 20
    #[serde(default = "EnforcementConfig::default_spike_threshold")]
    pub spike_threshold: i32,

    /// Length of a clamp session; repeated triggers extend it.
    /// Default: 10000 (10s)
    #[serde(default = "EnforcementConfig::default_clamp_duration_ms")]
    pub clamp_duration_ms: u64,

    /// Period of the clamp correction tick.
    /// Default: 10
    #[serde(default = "EnforcementConfig::default_clamp_interval_ms")]
    pub clamp_interval_ms: u64,
}

impl EnforcementConfig {
    fn default_danger_window_ms() -> u64 {
        60_000
    }

    fn default_spike_threshold() -> i32 {
        20
    }

    fn default_clamp_duration_ms() -> u64 {
        10_000
    }

    fn default_clamp_interval_ms() -> u64 {
        10
    }

    pub fn danger_window(&self) -> Duration {
        Duration::from_millis(self.danger_window_ms)
    }

    pub fn clamp_duration(&self) -> Duration {
        Duration::from_millis(self.clamp_duration_ms)
    }

    /// Clamp tick period, never zero.
    pub fn clamp_interval(&self) -> Duration {
        Duration::from_millis(self.clamp_interval_ms.max(1))
    }
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            danger_window_ms: Self::default_danger_window_ms(),
            spike_threshold: Self::default_spike_threshold(),
            clamp_duration_ms: Self::default_clamp_duration_ms(),
            clamp_interval_ms: Self::default_clamp_interval_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (trace, debug, info, warn, error or an EnvFilter string).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,

    /// Byte cap of the in-memory event log shown to users.
    /// Default: 10000
    #[serde(default = "TelemetryConfig::default_log_buffer_bytes")]
    pub log_buffer_bytes: usize,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_log_buffer_bytes() -> usize {
        10_000
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            log_buffer_bytes: Self::default_log_buffer_bytes(),
        }
    }
}

/// Settings for the `pactl` platform adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Volume percentage treated as the platform maximum.
    /// Default: 100
    #[serde(default = "PulseConfig::default_max_volume")]
    pub max_volume: i32,

    /// Path or name of the pactl binary.
    /// Default: pactl
    #[serde(default = "PulseConfig::default_pactl")]
    pub pactl: String,
}

impl PulseConfig {
    fn default_max_volume() -> i32 {
        100
    }

    fn default_pactl() -> String {
        "pactl".to_string()
    }
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            max_volume: Self::default_max_volume(),
            pactl: Self::default_pactl(),
        }
    }
}
