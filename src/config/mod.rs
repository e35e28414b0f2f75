//! Configuration loading and management for the payroll service.
//!
//! This module provides functionality to load the service configuration
//! from a YAML file: server, logging, lock timeout, idempotency gate,
//! side-effect retry and storage settings.
//!
//! # Example
//!
//! ```no_run
//! use payroll_core::config::ConfigLoader;
//!
//! let config = ConfigLoader::load("./config/payroll.yaml").unwrap();
//! println!("Lock timeout: {:?}", config.config().payroll.lock_timeout());
//! ```

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    IdempotencyConfig, LoggingConfig, PayrollConfig, ServerConfig, ServiceConfig,
    SideEffectsConfig, StorageBackend, StorageConfig,
};
