//! Server configuration loading from file and environment variables.

use kindred_generation::GenerationConfig;
use kindred_types::RateLimitPolicy;
use kindred_voice::SpeechConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Friend generation limits per caller class.
    #[serde(default)]
    pub rate_limit: RateLimitPolicy,

    /// Chat and image provider.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Text-to-speech provider.
    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL clients use to reach this server. Stored image URLs are
    /// built from it, so it must be externally resolvable.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Set when a reverse proxy fronts the server and rewrites
    /// `X-Forwarded-For`. Otherwise the header is ignored and anonymous
    /// quotas key on the socket peer.
    #[serde(default)]
    pub trusted_proxy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "kindred_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

/// Where generated profile images are written.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_db_path() -> String {
    "kindred.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            trusted_proxy: false,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `KINDRED_HOST`, `KINDRED_PORT`, `KINDRED_PUBLIC_URL` override `server.*`
/// - `KINDRED_TRUSTED_PROXY` overrides `server.trusted_proxy` ("true" or "1")
/// - `KINDRED_DB_PATH` overrides `database.path`
/// - `KINDRED_LOG_LEVEL` overrides `logging.level`
/// - `KINDRED_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `KINDRED_UPLOAD_DIR` overrides `storage.upload_dir`
/// - `OPENAI_API_KEY` overrides `generation.api_key`
/// - `DEEPGRAM_API_KEY` overrides `speech.api_key`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };
    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

fn apply_env_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(host) = var("KINDRED_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("KINDRED_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(url) = var("KINDRED_PUBLIC_URL") {
        config.server.public_url = url;
    }
    if let Some(trusted) = var("KINDRED_TRUSTED_PROXY") {
        config.server.trusted_proxy = trusted == "true" || trusted == "1";
    }
    if let Some(db_path) = var("KINDRED_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("KINDRED_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("KINDRED_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(dir) = var("KINDRED_UPLOAD_DIR") {
        config.storage.upload_dir = dir;
    }
    if let Some(key) = var("OPENAI_API_KEY") {
        config.generation.api_key = key;
    }
    if let Some(key) = var("DEEPGRAM_API_KEY") {
        config.speech.api_key = key;
    }
    config
}
