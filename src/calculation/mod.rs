//! Payroll calculation engine.
//!
//! The calculation engine is a collaborator of the finalize orchestrator:
//! a period run asks it for one [`PayrollResult`] per eligible employee and
//! stores them. Finalization only reads the stored rows and never re-runs
//! or second-guesses the calculation.

mod net_pay;

pub use net_pay::{BASE_PAY_CODE, NetPayCalculator};

use crate::error::CoreResult;
use crate::models::{Employee, PayrollInput, PayrollPeriod, PayrollResult};

/// Computes payroll results for a period.
pub trait PayrollCalculator: Send + Sync {
    /// Returns one result per eligible employee in `employees`.
    fn calculate(
        &self,
        period: &PayrollPeriod,
        employees: &[Employee],
        inputs: &[PayrollInput],
    ) -> CoreResult<Vec<PayrollResult>>;
}
