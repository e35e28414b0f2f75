//! Core data models for the payroll core.
//!
//! This module contains all the domain models used throughout the crate.

mod employee;
mod idempotency;
mod payroll_result;
mod payslip;
mod period;

pub use employee::{Employee, InputKind, PayrollInput};
pub use idempotency::{IdempotencyRecord, IdempotencyScope, StoredResponse};
pub use payroll_result::{PayCategory, PayLine, PayrollResult};
pub use payslip::Payslip;
pub use period::{PayrollPeriod, PeriodStatus};
