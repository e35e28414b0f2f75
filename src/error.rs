//! Error types for the payroll finalization core.
//!
//! This module provides strongly-typed errors using the `thiserror` crate
//! for every failure the core can report, from request validation through
//! state-machine violations to storage faults.

use thiserror::Error;
use uuid::Uuid;

use crate::models::PeriodStatus;

/// The main error type for the payroll core.
///
/// All operations return this error type. The HTTP layer maps each variant
/// to a status code and a stable machine-readable code.
///
/// # Example
///
/// ```
/// use payroll_core::error::CoreError;
///
/// let error = CoreError::Validation {
///     message: "missing Idempotency-Key header".to_string(),
/// };
/// assert_eq!(error.to_string(), "Validation error: missing Idempotency-Key header");
/// ```
#[derive(Debug, Error)]
pub enum CoreError {
    /// A request-level precondition was violated before any state was touched.
    #[error("Validation error: {message}")]
    Validation {
        /// What was wrong with the request.
        message: String,
    },

    /// The period is not in a status that permits the requested transition.
    #[error("Invalid state for period {period_id} ({status}): {message}")]
    InvalidState {
        /// The period the transition was attempted on.
        period_id: Uuid,
        /// The status observed while holding the row lock.
        status: PeriodStatus,
        /// Why the transition was refused.
        message: String,
    },

    /// An idempotency key was reused for a different logical request.
    #[error("Idempotency key '{key}' was already used for a different request to {endpoint}")]
    IdempotencyConflict {
        /// The reused key.
        key: String,
        /// The endpoint the key is bound to.
        endpoint: String,
    },

    /// No period with this id exists for the tenant.
    #[error("Payroll period not found: {period_id}")]
    PeriodNotFound {
        /// The period id that was looked up.
        period_id: Uuid,
    },

    /// No payslip with this id exists for the tenant.
    #[error("Payslip not found: {payslip_id}")]
    PayslipNotFound {
        /// The payslip id that was looked up.
        payslip_id: Uuid,
    },

    /// The period row lock could not be acquired within the configured bound.
    #[error("Timed out after {waited_ms}ms waiting for the lock on period {period_id}")]
    LockTimeout {
        /// The contended period.
        period_id: Uuid,
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// The calculation engine rejected the period's inputs.
    #[error("Calculation error: {message}")]
    Calculation {
        /// A description of the calculation error.
        message: String,
    },

    /// Payslip document rendering failed.
    #[error("Failed to render payslip {payslip_id}: {message}")]
    Rendering {
        /// The payslip being rendered.
        payslip_id: Uuid,
        /// The renderer's error.
        message: String,
    },

    /// The backing store failed. Nothing was committed.
    #[error("Storage error: {message}")]
    Storage {
        /// A description of the storage failure.
        message: String,
    },

    /// Configuration file was not found at the specified path.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// The path that was not found.
        path: String,
    },

    /// Configuration file could not be parsed.
    #[error("Failed to parse configuration file '{path}': {message}")]
    ConfigParseError {
        /// The path to the file that failed to parse.
        path: String,
        /// A description of the parse error.
        message: String,
    },
}

impl CoreError {
    /// Shorthand for a [`CoreError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`CoreError::Storage`].
    pub fn storage(message: impl Into<String>) -> Self {
        CoreError::Storage {
            message: message.into(),
        }
    }
}

/// A type alias for Results that return CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
