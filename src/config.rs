//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`. Every section has defaults, so
//! an empty file is a valid configuration.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub betslip: BetSlipConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_database_url() -> String {
    "sqlite://sportsbook.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            database_url: default_database_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BetSlipConfig {
    /// Directory holding one cached slip per identity.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

fn default_cache_dir() -> String {
    "data/betslips".to_string()
}

impl Default for BetSlipConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub base_url: String,
    /// Env var holding the feed key. Unset means the free tier key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
}

fn default_feed_url() -> String {
    "https://www.thesportsdb.com/api/v1/json".to_string()
}

fn default_feed_timeout() -> u64 {
    15
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_feed_url(),
            api_key_env: None,
            timeout_secs: default_feed_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MigrationConfig {
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Relational database receiving the copy.
    #[serde(default = "default_target_url")]
    pub target_url: String,
}

fn default_backup_dir() -> String {
    "backup".to_string()
}

fn default_batch_size() -> usize {
    crate::migration::DEFAULT_BATCH_SIZE
}

fn default_target_url() -> String {
    "sqlite://sportsbook-relational.db".to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            backup_dir: default_backup_dir(),
            batch_size: default_batch_size(),
            target_url: default_target_url(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The results feed key, if one is configured and set.
    pub fn feed_api_key(&self) -> Option<String> {
        self.feed
            .api_key_env
            .as_deref()
            .and_then(|name| Self::resolve_env(name).ok())
    }
}
