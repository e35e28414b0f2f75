//! Net pay calculation.
//!
//! Gross pay is the employee's base pay plus earning inputs; net pay is
//! gross less deduction inputs. No statutory tax is modelled.

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::{
    Employee, InputKind, PayCategory, PayLine, PayrollInput, PayrollPeriod, PayrollResult,
};

use super::PayrollCalculator;

/// The line code used for base pay.
pub const BASE_PAY_CODE: &str = "base";

/// Computes base + earnings - deductions for each eligible employee.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetPayCalculator;

impl NetPayCalculator {
    /// Computes the result for a single employee.
    ///
    /// Inputs belonging to other employees are ignored. Amounts are rounded
    /// to cents.
    ///
    /// # Examples
    ///
    /// ```
    /// use payroll_core::calculation::NetPayCalculator;
    /// use payroll_core::models::{Employee, InputKind, PayrollInput, PayrollPeriod};
    /// use chrono::NaiveDate;
    /// use rust_decimal::Decimal;
    /// use uuid::Uuid;
    ///
    /// let period = PayrollPeriod::new(
    ///     "tenant_a",
    ///     "monthly",
    ///     NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
    ///     NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
    /// );
    /// let employee = Employee {
    ///     id: "emp_001".to_string(),
    ///     tenant_id: "tenant_a".to_string(),
    ///     name: "Ada".to_string(),
    ///     base_pay: Decimal::new(500000, 2),
    ///     hired_on: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
    ///     terminated_on: None,
    ///     active: true,
    /// };
    /// let bonus = PayrollInput {
    ///     id: Uuid::new_v4(),
    ///     tenant_id: "tenant_a".to_string(),
    ///     period_id: period.id,
    ///     employee_id: "emp_001".to_string(),
    ///     kind: InputKind::Earning,
    ///     code: "bonus".to_string(),
    ///     amount: Decimal::new(25000, 2),
    /// };
    ///
    /// let result = NetPayCalculator.calculate_employee(&period, &employee, &[bonus]).unwrap();
    /// assert_eq!(result.gross_pay, Decimal::new(525000, 2));
    /// assert_eq!(result.net_pay, Decimal::new(525000, 2));
    /// ```
    pub fn calculate_employee(
        &self,
        period: &PayrollPeriod,
        employee: &Employee,
        inputs: &[PayrollInput],
    ) -> CoreResult<PayrollResult> {
        if employee.base_pay < Decimal::ZERO {
            return Err(CoreError::Calculation {
                message: format!("employee '{}' has negative base pay", employee.id),
            });
        }

        let mut lines = vec![PayLine {
            category: PayCategory::Base,
            code: BASE_PAY_CODE.to_string(),
            amount: employee.base_pay.round_dp(2),
        }];

        for input in inputs.iter().filter(|i| i.employee_id == employee.id) {
            if input.amount < Decimal::ZERO {
                return Err(CoreError::Calculation {
                    message: format!(
                        "input '{}' for employee '{}' has a negative amount",
                        input.code, employee.id
                    ),
                });
            }
            let category = match input.kind {
                InputKind::Earning => PayCategory::Earning,
                InputKind::Deduction => PayCategory::Deduction,
            };
            lines.push(PayLine {
                category,
                code: input.code.clone(),
                amount: input.amount.round_dp(2),
            });
        }

        let gross_pay: Decimal = lines
            .iter()
            .filter(|l| l.category != PayCategory::Deduction)
            .map(|l| l.amount)
            .sum();
        let total_deductions: Decimal = lines
            .iter()
            .filter(|l| l.category == PayCategory::Deduction)
            .map(|l| l.amount)
            .sum();
        let net_pay = gross_pay - total_deductions;

        if net_pay < Decimal::ZERO {
            return Err(CoreError::Calculation {
                message: format!(
                    "deductions of {} exceed gross pay of {} for employee '{}'",
                    total_deductions, gross_pay, employee.id
                ),
            });
        }

        Ok(PayrollResult {
            id: Uuid::new_v4(),
            tenant_id: period.tenant_id.clone(),
            period_id: period.id,
            employee_id: employee.id.clone(),
            employee_name: employee.name.clone(),
            gross_pay,
            total_deductions,
            net_pay,
            lines,
            computed_at: Utc::now(),
        })
    }
}

impl PayrollCalculator for NetPayCalculator {
    fn calculate(
        &self,
        period: &PayrollPeriod,
        employees: &[Employee],
        inputs: &[PayrollInput],
    ) -> CoreResult<Vec<PayrollResult>> {
        employees
            .iter()
            .filter(|e| e.is_eligible_for(period))
            .map(|e| self.calculate_employee(period, e, inputs))
            .collect()
    }
}
