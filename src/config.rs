//! Classification rules and logging settings loaded from TOML.
//!
//! # Configuration File Format
//!
//! ```toml
//! cache_dir = ".cache"
//!
//! [file_types]
//! Docs = [".doc", ".docx"]
//! Pics = [".jpg", ".png"]
//!
//! # Extra folders appended below a file_types folder: Pics/Screens/2024
//! [nested_dirs]
//! Pics = ["Screens", "2024"]
//!
//! [logger]
//! style = "text"   # or "json"
//! level = "warn"
//! ```

use crate::file_types::{FileTypeTree, normalize_extension};
use crate::paths::{APP_DIR_NAME, CONFIG_FILE_NAME};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("invalid configuration in {}: {source}", .path.display())]
    ConfigInvalid {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("IO error on configuration file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// `json` for structured output, anything else for plain text.
    pub style: String,
    pub level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            style: "text".to_string(),
            level: "warn".to_string(),
        }
    }
}

impl LoggerConfig {
    pub fn is_json(&self) -> bool {
        self.style.eq_ignore_ascii_case("json")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanerConfig {
    /// Target folder (`a/b` for nesting) to the extensions it receives.
    #[serde(default)]
    pub file_types: BTreeMap<String, Vec<String>>,
    /// Sub-folders appended, in order, below a `file_types` folder.
    #[serde(default)]
    pub nested_dirs: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub logger: LoggerConfig,
    /// Trash directory; relative paths live below the config directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

fn default_cache_dir() -> String {
    ".cache".to_string()
}

impl Default for CleanerConfig {
    fn default() -> Self {
        let rules: [(&str, &[&str]); 14] = [
            ("Notes", &[".md", ".rtf", ".txt"]),
            ("Docs", &[".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx"]),
            ("EXE", &[".exe", ".appimage", ".msi"]),
            ("Vids", &[".mp4", ".mov", ".avi", ".mkv"]),
            ("Compressed", &[".zip", ".rar", ".tar", ".gz", ".7z"]),
            ("Scripts", &[".sh", ".bat"]),
            ("Installers", &[".deb", ".rpm"]),
            ("Books", &[".epub", ".mobi"]),
            ("Music", &[".mp3", ".wav", ".ogg", ".flac"]),
            ("PDFS", &[".pdf"]),
            ("Pics", &[".bmp", ".gif", ".jpg", ".jpeg", ".svg", ".png"]),
            ("Torrents", &[".torrent"]),
            (
                "CODE",
                &[
                    ".c", ".h", ".py", ".rs", ".go", ".js", ".ts", ".jsx", ".tsx", ".html", ".css",
                    ".php", ".java", ".cpp", ".cs", ".vb", ".sql", ".pl", ".swift", ".kt", ".r",
                    ".m", ".asm",
                ],
            ),
            (
                "Markup",
                &[
                    ".json", ".xml", ".yml", ".yaml", ".ini", ".toml", ".cfg", ".conf", ".log",
                ],
            ),
        ];

        Self {
            file_types: rules
                .iter()
                .map(|(folder, exts)| {
                    (
                        folder.to_string(),
                        exts.iter().map(|e| e.to_string()).collect(),
                    )
                })
                .collect(),
            nested_dirs: BTreeMap::new(),
            logger: LoggerConfig::default(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl CleanerConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. `.desktop_cleaner.toml` in the current directory
    /// 3. `~/.config/desktop_cleaner/.desktop_cleaner.toml`
    /// 4. Built-in defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a file is found (or explicitly given) but cannot be
    /// read or parsed.
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(CONFIG_FILE_NAME);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config").join(APP_DIR_NAME).join(CONFIG_FILE_NAME);
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load and normalize configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::ConfigInvalid {
            path: path.to_path_buf(),
            source,
        })?;
        config.normalize();
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Lower-cases extensions, adds the leading dot and drops duplicates.
    pub fn normalize(&mut self) {
        for extensions in self.file_types.values_mut() {
            let mut seen = Vec::with_capacity(extensions.len());
            for ext in extensions.drain(..) {
                let ext = normalize_extension(&ext);
                if !ext.is_empty() && !seen.contains(&ext) {
                    seen.push(ext);
                }
            }
            *extensions = seen;
        }
    }

    /// Writes the configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(io_err)
    }

    /// Writes the defaults to `path` unless a file already exists there.
    /// Returns whether a file was written.
    pub fn write_default_if_missing(path: &Path) -> ConfigResult<bool> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save(path)?;
        Ok(true)
    }

    pub fn file_type_tree(&self) -> FileTypeTree {
        FileTypeTree::from_rules(&self.file_types, &self.nested_dirs)
    }
}
