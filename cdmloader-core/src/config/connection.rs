//! Destination connection configuration.
//!
//! `ConnectionConfig` holds the non-secret half of a connection. The password
//! travels separately in [`Credentials`] and only meets the rest of the
//! settings inside the zeroizing URL returned by [`ConnectionConfig::to_url`].

use crate::config::Credentials;
use crate::error::{LoaderError, Result};
use crate::models::DatabaseType;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use zeroize::Zeroizing;

/// Default PostgreSQL port
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Configuration for destination connections.
///
/// # Security
/// This struct intentionally does NOT store passwords or credentials.
///
/// # Example
/// ```rust
/// use cdmloader_core::config::ConnectionConfig;
/// use cdmloader_core::models::DatabaseType;
///
/// let config = ConnectionConfig::new(DatabaseType::PostgreSQL, "localhost".to_string())
///     .with_port(5432)
///     .with_database("omop".to_string());
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Destination engine
    pub database_type: DatabaseType,
    /// Host address; ignored for SQLite
    pub host: String,
    pub port: Option<u16>,
    /// Database name, or the file path for SQLite
    pub database: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            database_type: DatabaseType::PostgreSQL,
            host: "localhost".to_string(),
            port: None,
            database: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.database_type {
            DatabaseType::SQLite => write!(
                f,
                "SQLite({})",
                self.database.as_deref().unwrap_or("<unset>")
            ),
            DatabaseType::PostgreSQL => write!(
                f,
                "PostgreSQL({}{}{})",
                self.host,
                self.port.map_or_else(String::new, |p| format!(":{}", p)),
                self.database
                    .as_ref()
                    .map_or_else(String::new, |db| format!("/{}", db))
            ),
        }
    }
}

impl ConnectionConfig {
    /// Creates a new connection config with safe defaults.
    pub fn new(database_type: DatabaseType, host: String) -> Self {
        Self {
            database_type,
            host,
            ..Default::default()
        }
    }

    /// SQLite database file (or `:memory:`).
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            database_type: DatabaseType::SQLite,
            host: String::new(),
            database: Some(path.into()),
            ..Default::default()
        }
    }

    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the database name, or the file path for SQLite.
    pub fn with_database(mut self, database: String) -> Self {
        self.database = Some(database);
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid
    pub fn validate(&self) -> Result<()> {
        match self.database_type {
            DatabaseType::PostgreSQL => {
                if self.host.is_empty() {
                    return Err(LoaderError::configuration("host cannot be empty"));
                }
                if self.port == Some(0) {
                    return Err(LoaderError::configuration("port must be greater than 0"));
                }
            }
            DatabaseType::SQLite => {
                if self.database.as_deref().is_none_or(str::is_empty) {
                    return Err(LoaderError::configuration(
                        "SQLite destination requires a database file path",
                    ));
                }
            }
        }

        if self.connect_timeout.is_zero() {
            return Err(LoaderError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Assembles a connection URL, percent-encoding the login.
    ///
    /// The returned string contains the password and is zeroed on drop; log
    /// it only through `redact_database_url`.
    ///
    /// # Errors
    /// Returns a configuration error if the settings are invalid or cannot
    /// form a URL.
    pub fn to_url(&self, credentials: Option<&Credentials>) -> Result<Zeroizing<String>> {
        self.validate()?;

        match self.database_type {
            DatabaseType::SQLite => {
                let path = self.database.as_deref().unwrap_or_default();
                if path == ":memory:" {
                    Ok(Zeroizing::new("sqlite::memory:".to_string()))
                } else {
                    Ok(Zeroizing::new(format!("sqlite://{}", path)))
                }
            }
            DatabaseType::PostgreSQL => {
                let mut url = url::Url::parse("postgres://localhost").map_err(|e| {
                    LoaderError::configuration(format!("Failed to build connection URL: {}", e))
                })?;
                url.set_host(Some(&self.host)).map_err(|_| {
                    LoaderError::configuration(format!("Invalid host '{}'", self.host))
                })?;
                url.set_port(Some(self.port.unwrap_or(DEFAULT_POSTGRES_PORT)))
                    .map_err(|_| LoaderError::configuration("Invalid port"))?;

                if let Some(credentials) = credentials {
                    url.set_username(credentials.username())
                        .map_err(|_| LoaderError::configuration("Invalid username"))?;
                    url.set_password(credentials.password())
                        .map_err(|_| LoaderError::configuration("Invalid password"))?;
                }

                if let Some(database) = &self.database {
                    url.set_path(database);
                }

                Ok(Zeroizing::new(url.to_string()))
            }
        }
    }
}
