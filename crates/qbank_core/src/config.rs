//! Store configuration.
//!
//! # Responsibility
//! - Carry the database location and the timeouts used by the provisioner.
//! - Load the same settings from environment variables for binaries.
//!
//! # Invariants
//! - Timeouts are always non-zero.

use std::env::var;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DB_PATH: &str = "QBANK_DB_PATH";
pub const ENV_MIGRATION_TIMEOUT_MS: &str = "QBANK_MIGRATION_TIMEOUT_MS";
pub const ENV_BUSY_TIMEOUT_MS: &str = "QBANK_BUSY_TIMEOUT_MS";

const DEFAULT_MIGRATION_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    db_path: PathBuf,
    migration_timeout: Duration,
    busy_timeout: Duration,
}

impl StoreConfig {
    /// Creates a config with default timeouts for the database file at `db_path`.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            migration_timeout: DEFAULT_MIGRATION_TIMEOUT,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Bound on one collection-creating migration, lock wait excluded.
    pub fn with_migration_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.migration_timeout = timeout;
        }
        self
    }

    /// How long a connection waits on a locked database file.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.busy_timeout = timeout;
        }
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn migration_timeout(&self) -> Duration {
        self.migration_timeout
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }

    /// Reads `QBANK_DB_PATH` (required) and the optional timeout overrides.
    ///
    /// # Errors
    /// - `ConfigError::Missing` when the database path is unset or blank.
    /// - `ConfigError::Invalid` when a timeout is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = match var(ENV_DB_PATH) {
            Ok(value) if !value.trim().is_empty() => value,
            _ => return Err(ConfigError::Missing(ENV_DB_PATH)),
        };

        let mut config = Self::new(db_path.trim());
        if let Some(timeout) = read_millis(ENV_MIGRATION_TIMEOUT_MS)? {
            config = config.with_migration_timeout(timeout);
        }
        if let Some(timeout) = read_millis(ENV_BUSY_TIMEOUT_MS)? {
            config = config.with_busy_timeout(timeout);
        }
        Ok(config)
    }
}

fn read_millis(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    let Ok(raw) = var(key) else {
        return Ok(None);
    };
    parse_millis(key, &raw).map(Some)
}

fn parse_millis(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        }),
        Ok(ms) => Ok(Duration::from_millis(ms)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "{key} is not set"),
            Self::Invalid { key, value } => {
                write!(f, "{key} must be a positive number of milliseconds, got `{value}`")
            }
        }
    }
}

impl Error for ConfigError {}
