//! Well-known locations, resolved once at startup and passed to constructors.

use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "desktop_cleaner";
pub const CONFIG_FILE_NAME: &str = ".desktop_cleaner.toml";
const REGISTRY_DB_NAME: &str = "central.db";
const CACHE_DIR_NAME: &str = ".cache";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub home: PathBuf,
    /// `~/.config/desktop_cleaner`
    pub config_dir: PathBuf,
    /// Trash for [`crate::fs_ops::move_to_trash`].
    pub cache_dir: PathBuf,
    pub registry_db: PathBuf,
    pub config_file: PathBuf,
}

impl AppPaths {
    /// Resolves paths below the user's home directory, or the current
    /// directory when no home can be determined.
    pub fn discover() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let mut paths = Self::from_config_dir(home.join(".config").join(APP_DIR_NAME));
        paths.home = home;
        paths
    }

    /// Places every file below `config_dir`.
    pub fn from_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        Self {
            home: config_dir.clone(),
            cache_dir: config_dir.join(CACHE_DIR_NAME),
            registry_db: config_dir.join(REGISTRY_DB_NAME),
            config_file: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        }
    }

    /// Uses `cache_dir` from the configuration; relative values live below the config dir.
    pub fn with_cache_dir(mut self, cache_dir: &Path) -> Self {
        if !cache_dir.as_os_str().is_empty() {
            self.cache_dir = self.config_dir.join(cache_dir);
        }
        self
    }
}
