//! Configuration loading functionality.
//!
//! This module provides the [`ConfigLoader`] type for loading the service
//! configuration from a YAML file.

use std::fs;
use std::path::Path;

use crate::error::{CoreError, CoreResult};

use super::types::ServiceConfig;

/// Loads and provides access to the service configuration.
///
/// # Example
///
/// ```no_run
/// use payroll_core::config::ConfigLoader;
///
/// let loader = ConfigLoader::load("./config/payroll.yaml")?;
/// println!("Listening on {}", loader.config().server.bind_addr);
/// # Ok::<(), payroll_core::error::CoreError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config: ServiceConfig,
}

impl ConfigLoader {
    /// Loads configuration from the YAML file at `path`.
    ///
    /// # Returns
    ///
    /// Returns a `ConfigLoader` instance on success, or an error if:
    /// - The file is missing or unreadable
    /// - The file contains invalid YAML or mistyped fields
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let config = Self::load_yaml::<ServiceConfig>(path.as_ref())?;
        Ok(Self { config })
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(content: &str) -> CoreResult<Self> {
        let config = serde_yaml::from_str(content).map_err(|e| CoreError::ConfigParseError {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { config })
    }

    /// Loads and parses a YAML file.
    fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> CoreResult<T> {
        let path_str = path.display().to_string();

        let content = fs::read_to_string(path).map_err(|_| CoreError::ConfigNotFound {
            path: path_str.clone(),
        })?;

        serde_yaml::from_str(&content).map_err(|e| CoreError::ConfigParseError {
            path: path_str,
            message: e.to_string(),
        })
    }

    /// Returns the underlying service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;
    use std::time::Duration;

    fn config_path() -> &'static str {
        "./config/payroll.yaml"
    }

    #[test]
    fn test_load_sample_configuration() {
        let result = ConfigLoader::load(config_path());
        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());

        let loader = result.unwrap();
        assert_eq!(loader.config().server.bind_addr, "0.0.0.0:8080");
        assert_eq!(loader.config().idempotency.header, "Idempotency-Key");
        assert_eq!(loader.config().storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let loader = ConfigLoader::from_yaml_str("payroll:\n  lock_timeout_ms: 250\n").unwrap();
        let config = loader.config();

        assert_eq!(config.payroll.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.side_effects.render_max_attempts, 3);
        assert_eq!(config.idempotency.max_body_bytes, 1024 * 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_postgres_backend_parses() {
        let yaml = r#"
storage:
  backend: postgres
  database_url: "postgres://payroll@localhost/payroll"
  max_connections: 4
"#;
        let loader = ConfigLoader::from_yaml_str(yaml).unwrap();
        let storage = &loader.config().storage;
        assert_eq!(storage.backend, StorageBackend::Postgres);
        assert_eq!(storage.max_connections, 4);
        assert!(storage.database_url.is_some());
    }

    #[test]
    fn test_invalid_yaml_returns_parse_error() {
        let result = ConfigLoader::from_yaml_str("payroll:\n  lock_timeout_ms: soon\n");
        assert!(matches!(result, Err(CoreError::ConfigParseError { .. })));
    }

    #[test]
    fn test_load_missing_file_returns_error() {
        let result = ConfigLoader::load("/nonexistent/payroll.yaml");

        match result {
            Err(CoreError::ConfigNotFound { path }) => {
                assert!(path.contains("payroll.yaml"));
            }
            _ => panic!("Expected ConfigNotFound error"),
        }
    }
}
