//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, WardenConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/audiowarden/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("audiowarden/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("audiowarden.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file into a raw table.
pub fn load_from_file(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

/// Parse a TOML string into a raw table.
///
/// Tables are merged before deserialization so that a later file only
/// overrides the keys it actually sets.
pub fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse::<toml::Table>()
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Deserialize a merged table into the typed config.
pub fn table_to_config(table: toml::Table, origin: &Path) -> Result<WardenConfig, ConfigError> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
}

/// Merge two tables, with `overlay` taking precedence.
///
/// Nested tables merge key by key; any other value in `overlay` replaces
/// the one in `base`.
pub fn merge_tables(mut base: toml::Table, overlay: toml::Table) -> toml::Table {
    for (key, value) in overlay {
        let merged = match (base.remove(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                toml::Value::Table(merge_tables(existing, incoming))
            }
            (_, value) => value,
        };
        base.insert(key, merged);
    }
    base
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut WardenConfig, sources: &mut ConfigSources) {
    apply_env_overrides_from(config, sources, env::vars());
}

/// Apply overrides from an explicit set of variables.
pub fn apply_env_overrides_from<I>(config: &mut WardenConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut rust_log = None;

    for (key, value) in vars {
        let applied = match key.as_str() {
            "AUDIOWARDEN_HIJACKER" => {
                config.pair.hijacker = value;
                true
            }
            "AUDIOWARDEN_SAFE_TARGET" => {
                config.pair.safe_target = value;
                true
            }
            "AUDIOWARDEN_LOG_LEVEL" => {
                config.telemetry.log_level = value;
                true
            }
            // Applied last so it wins over AUDIOWARDEN_LOG_LEVEL regardless of order
            "RUST_LOG" => {
                rust_log = Some(value);
                false
            }
            "AUDIOWARDEN_DANGER_WINDOW_MS" => match value.parse() {
                Ok(ms) => {
                    config.enforcement.danger_window_ms = ms;
                    true
                }
                Err(_) => false,
            },
            "AUDIOWARDEN_CLAMP_DURATION_MS" => match value.parse() {
                Ok(ms) => {
                    config.enforcement.clamp_duration_ms = ms;
                    true
                }
                Err(_) => false,
            },
            _ => false,
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }

    if let Some(level) = rust_log {
        config.telemetry.log_level = level;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}
