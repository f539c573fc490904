use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chatsnip: ChatsnipConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// Chatsnip-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChatsnipConfig {
    pub db_path: PathBuf,
    /// Directory that stores retrieved image binaries. Created on startup
    /// if missing; served back under /media by the HTTP server.
    pub media_dir: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

/// Remote image retrieval configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    /// Timeout applied by the HTTP client. The ingestion core itself never
    /// retries; a timed-out fetch surfaces as a transport error.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_allowed_origins() -> Vec<String> {
    // Default empty; set allowed_origins in config.toml for production
    vec![]
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in CHATSNIP_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config_path = std::env::var("CHATSNIP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .context("Failed to parse config.toml")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.chatsnip.db_path.as_os_str().is_empty() {
            anyhow::bail!("chatsnip.db_path must not be empty");
        }

        if self.chatsnip.media_dir.as_os_str().is_empty() {
            anyhow::bail!(
                "chatsnip.media_dir must not be empty. Set media_dir in config.toml to the directory that should hold retrieved images."
            );
        }

        // media_dir is created lazily, but an existing path must be a directory
        if self.chatsnip.media_dir.exists() && !self.chatsnip.media_dir.is_dir() {
            anyhow::bail!(
                "media_dir must be a directory, not a file: {}",
                self.chatsnip.media_dir.display()
            );
        }

        if self.retrieval.fetch_timeout_secs == 0 {
            anyhow::bail!("retrieval.fetch_timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.chatsnip.db_path
    }

    /// Get the media root path (media_dir from config.toml)
    pub fn media_dir(&self) -> &Path {
        &self.chatsnip.media_dir
    }
}
