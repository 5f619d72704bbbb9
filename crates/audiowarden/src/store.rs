//! Pair configuration backed by the layered config files.

use std::path::PathBuf;

use wardenconf::{ConfigError, PairConfig, WardenConfig};

use crate::ports::ConfigStore;

/// Re-reads the config files on every load, so edits apply to the next event.
#[derive(Debug, Clone, Default)]
pub struct FileConfigStore {
    path: Option<PathBuf>,
}

impl FileConfigStore {
    /// Discover config files the usual way; `path` replaces the local file.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Result<PairConfig, ConfigError> {
        WardenConfig::load_from(self.path.as_deref()).map(|config| config.pair)
    }
}
