use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite database path (default: "./data/logboard.db")
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Stream session tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Push interval used when a client does not request one (default: 5)
    #[serde(default = "default_interval_secs")]
    pub default_interval_secs: u64,

    /// Consecutive failed ticks before a session is terminated (default: 3)
    #[serde(default = "default_failure_budget")]
    pub max_consecutive_failures: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_interval_secs(),
            max_consecutive_failures: default_failure_budget(),
        }
    }
}

/// Age-based record cleanup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Enable the cleanup task (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Records older than this many days are deleted (default: 30)
    #[serde(default = "default_retention_days")]
    pub days: u64,

    /// Hour of day to run cleanup (0-23, default: 3 for 3am UTC)
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u8,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            days: default_retention_days(),
            cleanup_hour: default_cleanup_hour(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_database_path() -> String {
    "./data/logboard.db".to_string()
}

fn default_interval_secs() -> u64 {
    5
}

fn default_failure_budget() -> u32 {
    3
}

fn default_retention_days() -> u64 {
    30
}

fn default_cleanup_hour() -> u8 {
    3
}

/// Load configuration from a TOML file (optional) plus `LOGBOARD__`
/// environment overrides.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("LOGBOARD").separator("__"))
        .build()?;

    let cfg: Config = settings.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if !(1..=60).contains(&cfg.stream.default_interval_secs) {
        anyhow::bail!("stream.default_interval_secs must be between 1 and 60");
    }
    if cfg.stream.max_consecutive_failures == 0 {
        anyhow::bail!("stream.max_consecutive_failures must be at least 1");
    }
    if cfg.retention.cleanup_hour > 23 {
        anyhow::bail!("retention.cleanup_hour must be between 0 and 23");
    }
    if cfg.retention.enabled && cfg.retention.days == 0 {
        anyhow::bail!("retention.days must be at least 1 when retention is enabled");
    }
    Ok(())
}
