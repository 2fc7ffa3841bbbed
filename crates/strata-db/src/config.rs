//! Connection configuration loading from file and environment variables.

use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Connection descriptor consumed once at pool construction.
///
/// `username` and `password` are part of the descriptor schema for drivers
/// that authenticate; the sqlite driver ignores them.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Driver identifier. Only `"sqlite"` is supported.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Path or URI of the database. Use `:memory:` for a private in-memory
    /// database, or a `file:<name>?mode=memory&cache=shared` URI when a
    /// pooled in-memory database must be visible to every connection.
    #[serde(default = "default_path")]
    pub path: String,

    /// Username for drivers that authenticate. Ignored by sqlite.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for drivers that authenticate. Ignored by sqlite.
    #[serde(default)]
    pub password: Option<String>,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// Busy timeout applied to each connection, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// How long an acquisition waits on a saturated pool before failing,
    /// in milliseconds.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_driver() -> String {
    "sqlite".to_string()
}

fn default_path() -> String {
    "strata.db".to_string()
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_acquire_timeout_ms() -> u64 {
    30_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            path: default_path(),
            username: None,
            password: None,
            pool_max_size: default_pool_max_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `STRATA_DB_PATH` overrides `database.path`
/// - `STRATA_DB_USER` overrides `database.username`
/// - `STRATA_DB_PASSWORD` overrides `database.password`
/// - `STRATA_POOL_MAX_SIZE` overrides `database.pool_max_size`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
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

    // Environment variable overrides
    if let Ok(db_path) = std::env::var("STRATA_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(user) = std::env::var("STRATA_DB_USER") {
        config.database.username = Some(user);
    }
    if let Ok(password) = std::env::var("STRATA_DB_PASSWORD") {
        config.database.password = Some(password);
    }
    if let Ok(size) = std::env::var("STRATA_POOL_MAX_SIZE") {
        if let Ok(parsed) = size.parse() {
            config.database.pool_max_size = parsed;
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_no_file_given() {
        let config = load_config(None).expect("defaults should load");
        assert_eq!(config.database.driver, "sqlite");
        assert_eq!(config.database.pool_max_size, 8);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert!(config.database.username.is_none());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            "[database]\npath = \"file:conf?mode=memory&cache=shared\"\npool_max_size = 3\n"
        )
        .expect("write config");

        let config =
            load_config(Some(file.path().to_str().expect("utf-8 path"))).expect("should parse");
        assert_eq!(config.database.path, "file:conf?mode=memory&cache=shared");
        assert_eq!(config.database.pool_max_size, 3);
        // untouched fields keep their defaults
        assert_eq!(config.database.busy_timeout_ms, 5_000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "[database\npath = ").expect("write config");

        let err = load_config(Some(file.path().to_str().expect("utf-8 path")))
            .expect_err("malformed toml should fail");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
