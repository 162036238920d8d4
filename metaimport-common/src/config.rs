//! Configuration loading and path resolution
//!
//! Config file resolution priority order:
//! 1. Command-line argument (highest priority)
//! 2. `METAIMPORT_CONFIG` environment variable
//! 3. `<config_dir>/metaimport/config.toml`
//! 4. Compiled defaults (no file)
//!
//! A missing config file is not an error; the caller gets the defaults and
//! decides how loudly to report it.

use crate::{Error, MergeStrategy, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "METAIMPORT_CONFIG";
/// Environment variable naming the library database
pub const LIBRARY_ENV_VAR: &str = "METAIMPORT_LIBRARY";
/// Environment variable carrying the YouTube Data API key
pub const YOUTUBE_API_KEY_ENV_VAR: &str = "METAIMPORT_YOUTUBE_API_KEY";

const APP_DIR: &str = "metaimport";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Library database path (optional, see [`resolve_library_path`])
    #[serde(default)]
    pub library: Option<PathBuf>,

    #[serde(default)]
    pub metaimport: ImportConfig,

    #[serde(default)]
    pub youtube: YouTubeConfig,

    #[serde(default)]
    pub jiosaavn: JioSaavnConfig,
}

/// `[metaimport]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Source identifiers in preference order (first = highest priority)
    pub sources: Vec<String>,
    /// Fields that never take part in merge or apply
    pub exclude_fields: BTreeSet<String>,
    /// `priority` or `union`; anything else falls back to `priority`
    pub merge_strategy: MergeStrategy,
    /// Diagnostic verbosity only
    pub debug: bool,
    /// Write file tags after storing records
    pub write: bool,
    /// Flexible attributes allowed in addition to those declared by sources
    pub extra_fields: BTreeSet<String>,
    /// Minimum similarity for the non-interactive chooser
    pub auto_threshold: f64,
    /// Candidates offered per lookup
    pub max_candidates: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            sources: vec!["youtube".to_string(), "jiosaavn".to_string()],
            exclude_fields: BTreeSet::new(),
            merge_strategy: MergeStrategy::Priority,
            debug: false,
            write: false,
            extra_fields: BTreeSet::new(),
            auto_threshold: 0.8,
            max_candidates: 10,
        }
    }
}

/// `[youtube]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct YouTubeConfig {
    pub api_key: Option<String>,
    /// Override for the Data API base URL
    pub base_url: Option<String>,
}

impl YouTubeConfig {
    /// Resolve the API key: environment first, then TOML.
    ///
    /// Returns `None` when neither carries a non-blank key.
    pub fn resolve_api_key(&self) -> Option<String> {
        let env_key = std::env::var(YOUTUBE_API_KEY_ENV_VAR)
            .ok()
            .filter(|k| is_valid_key(k));
        let toml_key = self.api_key.clone().filter(|k| is_valid_key(k));

        if env_key.is_some() && toml_key.is_some() {
            tracing::warn!(
                "YouTube API key found in both environment and TOML config. Using environment."
            );
        }

        env_key.or(toml_key)
    }
}

/// `[jiosaavn]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JioSaavnConfig {
    /// Override for the web API endpoint
    pub base_url: Option<String>,
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// No file found, compiled defaults in use
    Defaults,
}

/// Loaded configuration plus its origin, for startup logging
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: ConfigSource,
}

/// Resolve the config file path by priority order.
///
/// Explicit paths (CLI, environment) are returned even if they do not exist
/// so that [`load_config`] can report them; the default location is only
/// returned when the file is present.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_path().filter(|p| p.exists())
}

/// Platform default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

/// Load configuration following [`resolve_config_path`].
///
/// An explicitly named file that does not exist is an error. A file that
/// fails to parse is always an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<LoadedConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let config = load_config_file(&path)?;
            Ok(LoadedConfig {
                config,
                source: ConfigSource::File(path),
            })
        }
        None => Ok(LoadedConfig {
            config: TomlConfig::default(),
            source: ConfigSource::Defaults,
        }),
    }
}

/// Parse one TOML config file
pub fn load_config_file(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    parse_config(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Parse TOML config text
pub fn parse_config(content: &str) -> std::result::Result<TomlConfig, toml::de::Error> {
    toml::from_str(content)
}

/// Resolve the library database path:
/// CLI argument → `METAIMPORT_LIBRARY` → `library` config key → data dir default.
pub fn resolve_library_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(LIBRARY_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.library {
        return path.clone();
    }

    default_library_path()
}

/// OS-dependent default library location
fn default_library_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR).join("library.db"))
        .unwrap_or_else(|| PathBuf::from("./metaimport_data/library.db"))
}
