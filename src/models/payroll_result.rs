//! Computed payroll result models.
//!
//! A [`PayrollResult`] is produced per eligible employee by a period run and
//! is the read-only input to finalization.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The category of a pay line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayCategory {
    /// The employee's base pay for the period.
    Base,
    /// An additional earning input.
    Earning,
    /// A deduction input.
    Deduction,
}

/// A single line on a result or payslip.
///
/// # Example
///
/// ```
/// use payroll_core::models::{PayCategory, PayLine};
/// use rust_decimal::Decimal;
///
/// let line = PayLine {
///     category: PayCategory::Base,
///     code: "base".to_string(),
///     amount: Decimal::new(500000, 2),
/// };
/// assert_eq!(line.signed_amount(), Decimal::new(500000, 2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayLine {
    /// Base, earning or deduction.
    pub category: PayCategory,
    /// Short code identifying the line.
    pub code: String,
    /// Unsigned amount of the line.
    pub amount: Decimal,
}

impl PayLine {
    /// Returns the amount with deductions negated.
    pub fn signed_amount(&self) -> Decimal {
        match self.category {
            PayCategory::Deduction => -self.amount,
            PayCategory::Base | PayCategory::Earning => self.amount,
        }
    }
}

/// One employee's computed pay for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollResult {
    /// Unique identifier of the result row.
    pub id: Uuid,
    /// The tenant that owns the result.
    pub tenant_id: String,
    /// The period the result was computed for.
    pub period_id: Uuid,
    /// The employee the result belongs to.
    pub employee_id: String,
    /// Employee display name at calculation time.
    pub employee_name: String,
    /// Base pay plus earnings.
    pub gross_pay: Decimal,
    /// Sum of deductions.
    pub total_deductions: Decimal,
    /// Gross pay less deductions.
    pub net_pay: Decimal,
    /// Itemised lines making up the totals.
    pub lines: Vec<PayLine>,
    /// When the calculation ran.
    pub computed_at: DateTime<Utc>,
}
