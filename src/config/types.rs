//! Configuration types for the payroll service.
//!
//! This module contains the strongly-typed configuration structures that
//! are deserialized from the YAML service configuration file. Every field
//! has a default so a partial file is valid.

use std::time::Duration;

use serde::Deserialize;

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Payroll state-machine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PayrollConfig {
    /// Upper bound on waiting for a period row lock, in milliseconds.
    pub lock_timeout_ms: u64,
}

impl PayrollConfig {
    /// Returns the lock timeout as a [`Duration`].
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for PayrollConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
        }
    }
}

/// Idempotency gate settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Name of the request header carrying the key.
    pub header: String,
    /// Largest request body the gate will buffer for fingerprinting.
    pub max_body_bytes: usize,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            header: "Idempotency-Key".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Post-commit side-effect settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SideEffectsConfig {
    /// Attempts per payslip document before giving up.
    pub render_max_attempts: u32,
    /// Base delay between attempts, multiplied by the attempt number.
    pub retry_backoff_ms: u64,
}

impl Default for SideEffectsConfig {
    fn default() -> Self {
        Self {
            render_max_attempts: 3,
            retry_backoff_ms: 200,
        }
    }
}

/// Which storage backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Process-local store. Single instance only.
    #[default]
    Memory,
    /// Shared PostgreSQL database. Requires the `postgres` feature.
    Postgres,
}

/// Storage settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Selected backend.
    pub backend: StorageBackend,
    /// Connection string for the postgres backend.
    pub database_url: Option<String>,
    /// Pool size for the postgres backend.
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            max_connections: 10,
        }
    }
}

/// The complete service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// Payroll state-machine settings.
    pub payroll: PayrollConfig,
    /// Idempotency gate settings.
    pub idempotency: IdempotencyConfig,
    /// Post-commit side-effect settings.
    pub side_effects: SideEffectsConfig,
    /// Storage settings.
    pub storage: StorageConfig,
}
