use crate::core::error::{Result, TabulaError};
use crate::core::history::MAX_CAPACITY;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Options of a [`Database`](crate::database::Database), parsed from TOML.
///
/// Every field is optional in the file:
///
/// ```toml
/// database = "app"
/// silent = false
/// history_max = 100
/// error_max = 100
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default database for unqualified table names. When unset the
    /// connection's current database is used.
    pub database: Option<String>,
    /// Swallow statement failures instead of returning them
    pub silent: bool,
    /// Capacity of the statement history (0 disables it)
    pub history_max: usize,
    /// Capacity of the error history (0 disables it)
    pub error_max: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: None,
            silent: false,
            history_max: MAX_CAPACITY,
            error_max: MAX_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()
    }

    /// Sets an option by name. Accepts the short aliases used in connection
    /// option lists (`history`, `errors`, `db`, ...).
    pub fn set(&mut self, key: &str, value: &str) -> Result<&mut Self> {
        let key = key.trim().to_lowercase().replace('-', "_");
        match key.as_str() {
            "history" | "histories" | "historymax" | "history_max" => {
                self.history_max = parse_capacity(&key, value)?;
            }
            "error" | "errors" | "errormax" | "error_max" => {
                self.error_max = parse_capacity(&key, value)?;
            }
            "silent" | "is_silent" | "error_throw" => {
                let flag = parse_flag(&key, value)?;
                // error_throw is the inverse switch
                self.silent = if key == "error_throw" { !flag } else { flag };
            }
            "database" | "db" | "dbname" | "db_name" | "name" | "d" => {
                let value = value.trim();
                self.database = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            _ => {
                return Err(TabulaError::Config(format!("Unknown option '{}'", key)));
            }
        }
        debug!("Config option {} set to {}", key, value);
        Ok(self)
    }

    /// Clamps buffer capacities to the supported maximum.
    pub fn validate(mut self) -> Result<Self> {
        if self.history_max > MAX_CAPACITY {
            warn!(
                "history_max {} exceeds the maximum, using {}",
                self.history_max, MAX_CAPACITY
            );
            self.history_max = MAX_CAPACITY;
        }
        if self.error_max > MAX_CAPACITY {
            warn!(
                "error_max {} exceeds the maximum, using {}",
                self.error_max, MAX_CAPACITY
            );
            self.error_max = MAX_CAPACITY;
        }
        if matches!(&self.database, Some(db) if db.trim().is_empty()) {
            return Err(TabulaError::Config("database must not be empty".to_string()));
        }
        Ok(self)
    }
}

fn parse_capacity(key: &str, value: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        TabulaError::Config(format!("Option '{}' expects a number, got '{}'", key, value))
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(TabulaError::Config(format!(
            "Option '{}' expects a boolean, got '{}'",
            key, value
        ))),
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = tabula::config::load_config("tabula.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Config::from_toml_str(&content)
}

/// `<config dir>/tabula/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tabula").join("config.toml"))
}

/// Loads the per-user config file, falling back to defaults when it does not
/// exist.
pub fn load_default_config() -> Result<Config> {
    match default_config_path() {
        Some(path) if path.exists() => {
            debug!("Loading config from {}", path.display());
            load_config(path)
        }
        _ => Ok(Config::default()),
    }
}
