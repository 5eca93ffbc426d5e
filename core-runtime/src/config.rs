//! # Core Configuration Module
//!
//! Provides configuration management for the media import engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the settings the service facade needs to wire the
//! library store, the event bus and logging together. Validation runs in
//! [`CoreConfigBuilder::build`] so misconfiguration fails before any database
//! is opened.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/path/to/library.db")
//!     .max_connections(4)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! Leaving the database path unset selects an in-memory library, which is
//! what the test suites use.

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use crate::logging::LoggingConfig;
use std::path::PathBuf;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const MAX_CONNECTIONS_LIMIT: u32 = 64;
const MAX_EVENT_BUFFER_SIZE: usize = 65_536;

/// Core configuration for the media import engine.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Path to the SQLite library database. `None` keeps the library in memory.
    pub database_path: Option<PathBuf>,

    /// Maximum pooled SQLite connections
    pub max_connections: u32,

    /// Capacity of the event bus ring buffer
    pub event_buffer_size: usize,

    /// Logging setup applied at bootstrap. `None` leaves the subscriber alone.
    pub logging: Option<LoggingConfig>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            logging: None,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// True when the library lives only in memory.
    pub fn is_in_memory(&self) -> bool {
        self.database_path.is_none()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path, when given, is not empty
    /// - Connection count is within bounds
    /// - Event buffer size is within bounds
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.max_connections == 0 {
            return Err(Error::Config(
                "Max connections must be greater than 0".to_string(),
            ));
        }

        if self.max_connections > MAX_CONNECTIONS_LIMIT {
            return Err(Error::Config(format!(
                "Max connections exceeds maximum of {}",
                MAX_CONNECTIONS_LIMIT
            )));
        }

        if self.event_buffer_size == 0 || self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "Event buffer size must be between 1 and {}",
                MAX_EVENT_BUFFER_SIZE
            )));
        }

        Ok(())
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    max_connections: Option<u32>,
    event_buffer_size: Option<usize>,
    logging: Option<LoggingConfig>,
}

impl CoreConfigBuilder {
    /// Sets the database path.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder()
    ///     .database_path("/path/to/library.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the maximum number of pooled connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Installs a logging configuration applied at bootstrap.
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Builds the final configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when validation fails.
    pub fn build(self) -> Result<CoreConfig> {
        let defaults = CoreConfig::default();
        let config = CoreConfig {
            database_path: self.database_path,
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            event_buffer_size: self.event_buffer_size.unwrap_or(defaults.event_buffer_size),
            logging: self.logging,
        };

        config.validate()?;
        Ok(config)
    }
}
