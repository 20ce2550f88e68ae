//! Database Configuration
//!
//! Named connection definitions loaded from code, YAML or the environment.

use std::collections::HashSet;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backends::DriverKind;
use crate::error::OrmError;

/// Connection pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: Option<u64>,
    pub max_lifetime_seconds: Option<u64>,
    pub test_before_acquire: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600),  // 10 minutes
            max_lifetime_seconds: Some(1800), // 30 minutes
            test_before_acquire: true,
        }
    }
}

/// One named database connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub driver: DriverKind,
    pub url: String,
    #[serde(default)]
    pub pool: PoolConfig,
}

impl ConnectionConfig {
    pub fn new(name: impl Into<String>, driver: DriverKind, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver,
            url: url.into(),
            pool: PoolConfig::default(),
        }
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// The URL with any password replaced, safe for logs
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut parsed) => {
                if parsed.password().is_some() && parsed.set_password(Some("***")).is_err() {
                    return "<redacted>".to_string();
                }
                parsed.to_string()
            }
            Err(_) if self.url.contains('@') => "<redacted>".to_string(),
            Err(_) => self.url.clone(),
        }
    }
}

/// The full set of connections plus the default connection name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub default: String,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

impl DatabaseConfig {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            connections: Vec::new(),
        }
    }

    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections.iter().find(|c| c.name == name)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Load connections from `DB_*` environment variables.
    ///
    /// With `DB_CONNECTIONS=main,reporting` each connection reads
    /// `DB_MAIN_DRIVER`, `DB_MAIN_URL` and optionally `DB_MAIN_MAX_CONNECTIONS`.
    /// Without it a single connection is built from `DATABASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let names = match get_env_optional("DB_CONNECTIONS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>(),
            None => {
                let default = get_env_or_default("DB_CONNECTION", "default");
                let url = get_env_required("DATABASE_URL")?;
                let driver = DriverKind::from_url(&url).ok_or_else(|| ConfigError::InvalidValue {
                    field: "DATABASE_URL".to_string(),
                    value: url.clone(),
                    expected: "a URL with a known database scheme".to_string(),
                })?;
                return Ok(Self::new(default.clone())
                    .with_connection(ConnectionConfig::new(default, driver, url)));
            }
        };

        let default = match get_env_optional("DB_CONNECTION") {
            Some(default) => default,
            None => names.first().cloned().ok_or_else(|| ConfigError::ValidationFailed {
                field: "DB_CONNECTIONS".to_string(),
                reason: "at least one connection name is required".to_string(),
            })?,
        };

        let mut config = Self::new(default);
        for name in names {
            config.connections.push(connection_from_env(&name)?);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connections.is_empty() {
            return Err(ConfigError::ValidationFailed {
                field: "connections".to_string(),
                reason: "at least one connection must be configured".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for connection in &self.connections {
            if connection.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    field: "connections.name".to_string(),
                    reason: "connection name cannot be empty".to_string(),
                });
            }
            if !seen.insert(connection.name.as_str()) {
                return Err(ConfigError::ValidationFailed {
                    field: format!("connections.{}", connection.name),
                    reason: "connection name is defined more than once".to_string(),
                });
            }
            if connection.url.trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    field: format!("connections.{}.url", connection.name),
                    reason: "database URL cannot be empty".to_string(),
                });
            }
            if connection.pool.max_connections == 0
                || connection.pool.min_connections > connection.pool.max_connections
            {
                return Err(ConfigError::ValidationFailed {
                    field: format!("connections.{}.pool", connection.name),
                    reason: format!(
                        "min_connections ({}) must not exceed max_connections ({}), which must be positive",
                        connection.pool.min_connections, connection.pool.max_connections
                    ),
                });
            }
        }

        if !seen.contains(self.default.as_str()) {
            return Err(ConfigError::ValidationFailed {
                field: "default".to_string(),
                reason: format!("default connection '{}' is not configured", self.default),
            });
        }

        Ok(())
    }
}

fn env_prefix(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("DB_{}", normalized)
}

fn connection_from_env(name: &str) -> Result<ConnectionConfig, ConfigError> {
    let prefix = env_prefix(name);

    let url = get_env_required(&format!("{}_URL", prefix))?;
    let driver = match get_env_optional(&format!("{}_DRIVER", prefix)) {
        Some(driver) => driver.parse::<DriverKind>().map_err(|_| ConfigError::InvalidValue {
            field: format!("{}_DRIVER", prefix),
            value: driver.clone(),
            expected: "postgres, mysql, sqlite, sqlserver or memory".to_string(),
        })?,
        None => DriverKind::from_url(&url).ok_or_else(|| ConfigError::MissingEnvVar {
            var: format!("{}_DRIVER", prefix),
        })?,
    };

    let mut connection = ConnectionConfig::new(name, driver, url);

    let key = format!("{}_MAX_CONNECTIONS", prefix);
    if let Some(max) = get_env_optional(&key) {
        connection.pool.max_connections = max.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
            field: key.clone(),
            value: max.clone(),
            expected: "valid number".to_string(),
        })?;
        connection.pool.min_connections = connection.pool.min_connections.min(connection.pool.max_connections);
    }

    Ok(connection)
}

// Helper functions for environment variable handling
fn get_env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar {
        var: key.to_string(),
    })
}

fn get_env_optional(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn get_env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Validation failed for {field}: {reason}")]
    ValidationFailed { field: String, reason: String },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },

    #[error("Failed to read configuration file {path}: {message}")]
    ReadFailed { path: String, message: String },
}

impl From<ConfigError> for OrmError {
    fn from(err: ConfigError) -> Self {
        OrmError::Configuration(err.to_string())
    }
}
