//! Runtime configuration for europatch-server
//!
//! Resolved once at startup from the bootstrap TOML and command-line
//! overrides. Command line wins over TOML for port and root folder.

use europatch_common::config::{
    resolve_root_folder, CacheConfig, LoggingConfig, ScraperConfig, TomlConfig, DATABASE_FILE_NAME,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub logging: LoggingConfig,
    pub scraper: ScraperConfig,
    pub cache: CacheConfig,
}

impl ServerConfig {
    pub fn resolve(toml_config: TomlConfig, cli_port: Option<u16>, cli_root_folder: Option<&Path>) -> Self {
        let root_folder = resolve_root_folder(cli_root_folder, &toml_config);
        let database_path = root_folder.join(DATABASE_FILE_NAME);

        Self {
            bind_address: toml_config.bind_address,
            port: cli_port.unwrap_or(toml_config.port),
            root_folder,
            database_path,
            logging: toml_config.logging,
            scraper: toml_config.scraper,
            cache: toml_config.cache,
        }
    }

    /// `address:port` for the listener
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}
