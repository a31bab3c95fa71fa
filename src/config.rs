/*!
 * Configuration
 * Agent and storage settings: defaults, optional JSON file, environment
 *
 * Later sources win: `Default`, then the JSON file named by `CONFIG`, then
 * individual environment variables. Intervals are whole seconds.
 */

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::core::errors::ConfigError;
use crate::core::limits::{
    DEFAULT_POLL_INTERVAL, DEFAULT_RATE_LIMIT, DEFAULT_REPORT_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SNAPSHOT_PATH, DEFAULT_STORE_INTERVAL,
};

/// Environment variable naming the optional JSON config file
pub const CONFIG_ENV: &str = "CONFIG";

/// Agent settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Collector address, `host:port` or a full URL
    pub address: String,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    /// Concurrent in-flight flushes, at least 1
    pub rate_limit: usize,
    pub request_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "localhost:8080".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            report_interval: DEFAULT_REPORT_INTERVAL,
            rate_limit: DEFAULT_RATE_LIMIT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AgentFile {
    #[serde(alias = "addr")]
    address: Option<String>,
    poll_interval: Option<u64>,
    report_interval: Option<u64>,
    rate_limit: Option<i64>,
    request_timeout: Option<u64>,
}

impl AgentConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(|key| std::env::var(key).ok())
    }

    /// Load with an explicit variable lookup
    pub fn load<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let mut rate_limit = config.rate_limit as i64;

        if let Some(path) = lookup(CONFIG_ENV).filter(|p| !p.is_empty()) {
            let file: AgentFile = read_json(Path::new(&path))?;
            if let Some(address) = file.address {
                config.address = address;
            }
            if let Some(secs) = file.poll_interval {
                config.poll_interval = Duration::from_secs(secs);
            }
            if let Some(secs) = file.report_interval {
                config.report_interval = Duration::from_secs(secs);
            }
            if let Some(limit) = file.rate_limit {
                rate_limit = limit;
            }
            if let Some(secs) = file.request_timeout {
                config.request_timeout = Duration::from_secs(secs);
            }
        }

        if let Some(address) = lookup("ADDRESS") {
            config.address = address;
        }
        if let Some(secs) = env_value::<u64, _>(&lookup, "POLL_INTERVAL")? {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_value::<u64, _>(&lookup, "REPORT_INTERVAL")? {
            config.report_interval = Duration::from_secs(secs);
        }
        if let Some(limit) = env_value::<i64, _>(&lookup, "RATE_LIMIT")? {
            rate_limit = limit;
        }

        config.rate_limit = usize::try_from(rate_limit.max(1)).unwrap_or(DEFAULT_RATE_LIMIT);
        config.validate()?;
        debug!(?config, "agent configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "address",
                reason: "must not be empty".to_string(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "poll_interval",
                reason: "must be at least one second".to_string(),
            });
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "report_interval",
                reason: "must be at least one second".to_string(),
            });
        }
        Ok(())
    }
}

/// Server-side storage settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Snapshot interval; zero flushes on every store
    pub store_interval: Duration,
    pub file_path: PathBuf,
    /// Replay the snapshot at startup instead of truncating it
    pub restore: bool,
    /// Relational database file; takes precedence over the snapshot store
    pub database_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_interval: DEFAULT_STORE_INTERVAL,
            file_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            restore: true,
            database_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StorageFile {
    #[serde(alias = "interval")]
    store_interval: Option<u64>,
    #[serde(alias = "path")]
    file_path: Option<PathBuf>,
    restore: Option<bool>,
    #[serde(alias = "db_addr")]
    database_path: Option<String>,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(|key| std::env::var(key).ok())
    }

    pub fn load<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup(CONFIG_ENV).filter(|p| !p.is_empty()) {
            let file: StorageFile = read_json(Path::new(&path))?;
            if let Some(secs) = file.store_interval {
                config.store_interval = Duration::from_secs(secs);
            }
            if let Some(path) = file.file_path {
                config.file_path = path;
            }
            if let Some(restore) = file.restore {
                config.restore = restore;
            }
            if let Some(db) = file.database_path {
                config.database_path = non_empty_path(db);
            }
        }

        if let Some(secs) = env_value::<u64, _>(&lookup, "STORE_INTERVAL")? {
            config.store_interval = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("FILE_STORAGE_PATH") {
            config.file_path = PathBuf::from(path);
        }
        if let Some(value) = lookup("RESTORE") {
            config.restore = parse_bool(&value).ok_or_else(|| ConfigError::Env {
                var: "RESTORE",
                value: value.clone(),
                reason: "expected true or false".to_string(),
            })?;
        }
        if let Some(db) = lookup("DATABASE_DSN") {
            config.database_path = non_empty_path(db);
        }

        if config.database_path.is_none() && config.file_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "file_path",
                reason: "a snapshot path is required without a database".to_string(),
            });
        }
        debug!(?config, "storage configuration loaded");
        Ok(config)
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn env_value<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Env {
                var,
                value,
                reason: e.to_string(),
            }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" => Some(true),
        "0" | "false" | "f" | "no" => Some(false),
        _ => None,
    }
}

fn non_empty_path(value: String) -> Option<PathBuf> {
    if value.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}
