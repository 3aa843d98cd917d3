//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration comes from an optional TOML file. A missing or
//! malformed file never aborts startup: a warning is logged and built-in
//! defaults are used instead.
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`EUROPATCH_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "EUROPATCH_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "europatch.db";

/// Browser-like identification sent with every outbound page fetch
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound scraping configuration
    #[serde(default)]
    pub scraper: ScraperConfig,

    /// Manual / forum cache freshness
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stdout if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Outbound HTTP configuration for ModularGrid and forum pages
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    /// Site root used to absolutize relative links
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Single fixed timeout per fetch
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Freshness windows for cached manual text and forum rows
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_manual_ttl_days")]
    pub manual_ttl_days: i64,

    #[serde(default = "default_forum_ttl_days")]
    pub forum_ttl_days: i64,
}

fn default_port() -> u16 {
    5001
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "https://www.modulargrid.net".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_manual_ttl_days() -> i64 {
    30
}

fn default_forum_ttl_days() -> i64 {
    7
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            bind_address: default_bind_address(),
            logging: LoggingConfig::default(),
            scraper: ScraperConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            manual_ttl_days: default_manual_ttl_days(),
            forum_ttl_days: default_forum_ttl_days(),
        }
    }
}

/// Parse a TOML config file strictly
pub fn read_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load TOML config with graceful degradation
///
/// Explicit path first, then the platform config location. Any failure is
/// logged and replaced by defaults.
pub fn load_toml_config(explicit: Option<&Path>) -> TomlConfig {
    let path = match explicit.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => path,
        None => {
            info!("No config file location available, using built-in defaults");
            return TomlConfig::default();
        }
    };

    if !path.exists() {
        if explicit.is_some() {
            warn!("Config file {} not found, using built-in defaults", path.display());
        } else {
            info!("No config file at {}, using built-in defaults", path.display());
        }
        return TomlConfig::default();
    }

    match read_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} - using built-in defaults", e);
            TomlConfig::default()
        }
    }
}

/// Platform config file location (`<config_dir>/europatch/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("europatch").join("config.toml"))
}

/// Root folder resolution following the documented priority order
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("europatch"))
        .unwrap_or_else(|| PathBuf::from("./europatch_data"))
}

/// Create the root folder if missing and return the database path inside it
pub fn prepare_root_folder(root_folder: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root_folder)?;
    Ok(root_folder.join(DATABASE_FILE_NAME))
}
