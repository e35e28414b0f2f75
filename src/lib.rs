//! Payroll period finalization core.
//!
//! This crate turns reviewed payroll results into authoritative payslips
//! exactly once. Finalize runs as one transaction under an exclusive lock
//! on the period row, and its HTTP entry point is guarded by a generic
//! idempotency-key protocol so client retries never finalize twice.
//!
//! The main pieces:
//! - [`payroll::PayrollService`] drives the period state machine.
//! - [`idempotency::IdempotencyGate`] replays or rejects reused keys.
//! - [`store`] defines the storage ports and their backends.
//! - [`api::create_router`] exposes all of it over HTTP.

#![warn(missing_docs)]

pub mod api;
pub mod calculation;
pub mod config;
pub mod error;
pub mod idempotency;
pub mod models;
pub mod payroll;
pub mod store;
