//! Configuration management for zombiewatch.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::BackendKind;
use crate::zombie::ZombiePredicate;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "zombiewatch";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "locations.db";

/// Prefix of environment variable overrides.
const ENV_PREFIX: &str = "ZOMBIEWATCH_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `ZOMBIEWATCH_`, sections separated
///    by `__`, e.g. `ZOMBIEWATCH_STORAGE__LOCATIONS_LIMIT=50`)
/// 2. TOML config file at `~/.config/zombiewatch/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Zombie predicate configuration.
    pub zombie: ZombieConfig,
    /// HTTP server configuration.
    pub http: HttpConfig,
    /// Location ingestion configuration.
    pub ingest: IngestConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which backend holds the locations.
    pub backend: BackendKind,
    /// Path to the database file.
    /// Defaults to `~/.local/share/zombiewatch/locations.db`
    pub database_path: Option<PathBuf>,
    /// Maximum number of locations retained per driver.
    /// Zero or negative retains nothing.
    pub locations_limit: i64,
    /// Upper bound for a single backend operation, in milliseconds.
    pub operation_timeout_ms: u64,
}

/// Zombie predicate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZombieConfig {
    /// Drivers covering less than this many meters are zombies.
    pub distance_threshold_meters: u64,
    /// How far back the classifier looks, in seconds.
    pub time_window_secs: u64,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// How long in-flight requests get to finish on shutdown, in seconds.
    pub shutdown_timeout_secs: u64,
}

/// Location ingestion configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Topic name, used in logs.
    pub topic: String,
    /// Command carried by location update messages.
    pub command: String,
    /// Number of messages buffered before publishers wait.
    pub queue_capacity: usize,
    /// Number of messages handled concurrently.
    pub workers: usize,
    /// Deliveries of a failing message before it is dropped.
    pub max_attempts: u32,
    /// Delay before a failed message is redelivered, in milliseconds.
    pub requeue_delay_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            database_path: None, // Will be resolved to default at runtime
            locations_limit: 1000,
            operation_timeout_ms: 2000,
        }
    }
}

impl Default for ZombieConfig {
    fn default() -> Self {
        Self {
            distance_threshold_meters: 500,
            time_window_secs: 300,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_secs: 10,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            topic: "locations".to_string(),
            command: crate::ingest::UPDATE_LOCATION_COMMAND.to_string(),
            queue_capacity: 1024,
            workers: 4,
            max_attempts: 5,
            requeue_delay_ms: 500,
        }
    }
}

impl Config {
    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.storage.operation_timeout_ms == 0 {
            return Err(invalid("operation_timeout_ms must be greater than 0"));
        }

        if self.zombie.time_window_secs == 0 {
            return Err(invalid("time_window_secs must be greater than 0"));
        }

        if self.http.host.trim().is_empty() {
            return Err(invalid("http host must not be empty"));
        }

        if self.ingest.command.trim().is_empty() {
            return Err(invalid("ingest command must not be empty"));
        }

        for (name, value) in [
            ("queue_capacity", self.ingest.queue_capacity),
            ("workers", self.ingest.workers),
        ] {
            if value == 0 {
                return Err(invalid(format!("{name} must be greater than 0")));
            }
        }

        if self.ingest.max_attempts == 0 {
            return Err(invalid("max_attempts must be greater than 0"));
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Per-driver retention bound, with non-positive limits clamped to zero.
    #[must_use]
    pub fn retention(&self) -> usize {
        usize::try_from(self.storage.locations_limit).unwrap_or(0)
    }

    /// Get the backend operation timeout as a Duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.storage.operation_timeout_ms)
    }

    /// Build the zombie predicate.
    #[must_use]
    pub fn zombie_predicate(&self) -> ZombiePredicate {
        ZombiePredicate {
            distance_threshold_meters: self.zombie.distance_threshold_meters,
            time_window: Duration::from_secs(self.zombie.time_window_secs),
        }
    }

    /// Resolve the HTTP listen address.
    ///
    /// The host may be an IP literal (IPv6 without brackets) or a name;
    /// names use the first address they resolve to.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not resolve.
    pub async fn listen_addr(&self) -> Result<SocketAddr> {
        let host = self.http.host.as_str();
        tokio::net::lookup_host((host, self.http.port))
            .await
            .map_err(|e| invalid(format!("invalid http host {host}: {e}")))?
            .next()
            .ok_or_else(|| invalid(format!("http host {host} has no address")))
    }

    /// Get the graceful shutdown timeout as a Duration.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.http.shutdown_timeout_secs)
    }

    /// Get the requeue delay as a Duration.
    #[must_use]
    pub fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.ingest.requeue_delay_ms)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
