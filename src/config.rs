//! Configuration system
//!
//! Loads TOML configuration with per-field defaults and applies environment
//! variable overrides (`LOGHIVE_*`).

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub shutdown: ShutdownConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_read_timeout() -> u64 {
    15
}

fn default_write_timeout() -> u64 {
    15
}

fn default_idle_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

/// Chunk storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: usize,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Reserved; chunks are currently written uncompressed
    #[serde(default)]
    pub compression_enabled: bool,
}

fn default_storage_path() -> String {
    "./data/logs".to_string()
}

fn default_chunk_size() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_retention_days() -> u32 {
    7
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            chunk_size_bytes: default_chunk_size(),
            retention_days: default_retention_days(),
            compression_enabled: false,
        }
    }
}

/// Ingest pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_buffer_size() -> usize {
    1000
}

fn default_flush_interval() -> u64 {
    5000
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_workers() -> usize {
    4
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            flush_interval_ms: default_flush_interval(),
            max_batch_size: default_max_batch_size(),
            workers: default_workers(),
        }
    }
}

/// API key authentication
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub api_key: String,
}

/// Graceful shutdown budgets
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_ingestor_timeout")]
    pub ingestor_timeout_secs: u64,
}

fn default_http_timeout() -> u64 {
    30
}

fn default_ingestor_timeout() -> u64 {
    10
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            ingestor_timeout_secs: default_ingestor_timeout(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" for development or "json" for production
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from a file with environment overrides applied
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from the default location (`LOGHIVE_CONFIG` or `./config.toml`),
    /// falling back to defaults plus environment overrides
    pub fn load_default() -> Self {
        let path = std::env::var("LOGHIVE_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let path = PathBuf::from(path);

        if path.exists() {
            match Self::load_with_env(&path) {
                Ok(config) => {
                    tracing::info!(path = ?path, "Loaded config");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "Failed to load config, using defaults");
                }
            }
        }

        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `LOGHIVE_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("LOGHIVE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(path) = std::env::var("LOGHIVE_STORAGE_PATH") {
            self.storage.path = path;
        }
        if let Ok(days) = std::env::var("LOGHIVE_RETENTION_DAYS") {
            if let Ok(d) = days.parse() {
                self.storage.retention_days = d;
            }
        }
        if let Ok(api_key) = std::env::var("LOGHIVE_API_KEY") {
            if !api_key.is_empty() {
                self.auth.api_key = api_key;
                self.auth.enabled = true;
            }
        }
        if let Ok(level) = std::env::var("LOGHIVE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOGHIVE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.path, "./data/logs");
        assert_eq!(config.storage.retention_days, 7);
        assert_eq!(config.ingest.buffer_size, 1000);
        assert_eq!(config.ingest.workers, 4);
        assert!(!config.auth.enabled);
        assert_eq!(config.shutdown.http_timeout_secs, 30);
        assert_eq!(config.shutdown.ingestor_timeout_secs, 10);
    }

    #[test]
    fn test_partial_file_uses_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9999

[storage]
retention_days = 30
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.storage.retention_days, 30);
        // Unspecified fields keep their defaults.
        assert_eq!(config.storage.path, "./data/logs");
        assert_eq!(config.ingest.flush_interval_ms, 5000);
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not [valid toml").unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
