//! Payslip model.
//!
//! Payslips are the authoritative, employee-visible output of finalization.
//! There is at most one per (period, employee) pair.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PayLine, PayrollResult};

/// An employee's authoritative pay statement for a finalized period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payslip {
    /// Unique identifier of the payslip. Stable across re-finalization.
    pub id: Uuid,
    /// The tenant that owns the payslip.
    pub tenant_id: String,
    /// The period the payslip belongs to.
    pub period_id: Uuid,
    /// The employee the payslip is for.
    pub employee_id: String,
    /// Employee display name.
    pub employee_name: String,
    /// Base pay plus earnings.
    pub gross_pay: Decimal,
    /// Sum of deductions.
    pub total_deductions: Decimal,
    /// Amount paid to the employee.
    pub net_pay: Decimal,
    /// Itemised lines copied from the result.
    pub lines: Vec<PayLine>,
    /// When the payslip was first created.
    pub created_at: DateTime<Utc>,
    /// When the payslip was last written by a finalize.
    pub updated_at: DateTime<Utc>,
}

impl Payslip {
    /// Builds a new payslip from a computed result.
    pub fn from_result(result: &PayrollResult) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: result.tenant_id.clone(),
            period_id: result.period_id,
            employee_id: result.employee_id.clone(),
            employee_name: result.employee_name.clone(),
            gross_pay: result.gross_pay,
            total_deductions: result.total_deductions,
            net_pay: result.net_pay,
            lines: result.lines.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the financial fields of an existing payslip, keeping its
    /// identity and creation time.
    pub fn apply_result(&mut self, result: &PayrollResult) {
        self.employee_name = result.employee_name.clone();
        self.gross_pay = result.gross_pay;
        self.total_deductions = result.total_deductions;
        self.net_pay = result.net_pay;
        self.lines = result.lines.clone();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PayCategory;

    fn result(net: i64) -> PayrollResult {
        PayrollResult {
            id: Uuid::new_v4(),
            tenant_id: "tenant_a".to_string(),
            period_id: Uuid::nil(),
            employee_id: "emp_001".to_string(),
            employee_name: "Ada Lovelace".to_string(),
            gross_pay: Decimal::new(net, 2),
            total_deductions: Decimal::ZERO,
            net_pay: Decimal::new(net, 2),
            lines: vec![PayLine {
                category: PayCategory::Base,
                code: "base".to_string(),
                amount: Decimal::new(net, 2),
            }],
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_from_result_copies_totals() {
        let payslip = Payslip::from_result(&result(500000));
        assert_eq!(payslip.net_pay, Decimal::new(500000, 2));
        assert_eq!(payslip.employee_id, "emp_001");
        assert_eq!(payslip.lines.len(), 1);
    }

    #[test]
    fn test_apply_result_keeps_identity() {
        let mut payslip = Payslip::from_result(&result(500000));
        let id = payslip.id;
        let created_at = payslip.created_at;

        payslip.apply_result(&result(510000));

        assert_eq!(payslip.id, id);
        assert_eq!(payslip.created_at, created_at);
        assert_eq!(payslip.net_pay, Decimal::new(510000, 2));
    }
}
