//! Employee and payroll input models.
//!
//! Employees and their per-period inputs are owned by the HR records
//! collaborator; the payroll core only reads them when a period is run.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PayrollPeriod;

/// An employee as seen by the calculation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    /// Unique identifier for the employee.
    pub id: String,
    /// The tenant the employee belongs to.
    pub tenant_id: String,
    /// Display name used on the payslip.
    pub name: String,
    /// Base pay for one full period.
    pub base_pay: Decimal,
    /// The date the employee started employment.
    pub hired_on: NaiveDate,
    /// The last day of employment, if the employee has left.
    #[serde(default)]
    pub terminated_on: Option<NaiveDate>,
    /// Whether the employee record is active.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Employee {
    /// Returns true if the employee should be paid for `period`.
    ///
    /// An employee is eligible when active and employed on at least one
    /// day of the period.
    ///
    /// # Examples
    ///
    /// ```
    /// use payroll_core::models::{Employee, PayrollPeriod};
    /// use chrono::NaiveDate;
    /// use rust_decimal::Decimal;
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
    ///     hired_on: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
    ///     terminated_on: None,
    ///     active: true,
    /// };
    /// assert!(employee.is_eligible_for(&period));
    /// ```
    pub fn is_eligible_for(&self, period: &PayrollPeriod) -> bool {
        if !self.active || self.hired_on > period.end_date {
            return false;
        }
        self.terminated_on
            .is_none_or(|last_day| last_day >= period.start_date)
    }
}

/// Whether a payroll input adds to or subtracts from pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Added to gross pay (bonus, allowance, back pay).
    Earning,
    /// Subtracted from gross pay (salary sacrifice, recovery).
    Deduction,
}

/// A one-off adjustment for an employee in a specific period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollInput {
    /// Unique identifier of the input.
    pub id: Uuid,
    /// The tenant the input belongs to.
    pub tenant_id: String,
    /// The period the input applies to.
    pub period_id: Uuid,
    /// The employee the input applies to.
    pub employee_id: String,
    /// Earning or deduction.
    pub kind: InputKind,
    /// Short code, e.g. "bonus" or "salary_sacrifice".
    pub code: String,
    /// Non-negative amount; the sign comes from `kind`.
    pub amount: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn period() -> PayrollPeriod {
        PayrollPeriod::new(
            "tenant_a",
            "monthly",
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        )
    }

    fn employee() -> Employee {
        Employee {
            id: "emp_001".to_string(),
            tenant_id: "tenant_a".to_string(),
            name: "Ada Lovelace".to_string(),
            base_pay: Decimal::new(500000, 2),
            hired_on: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            terminated_on: None,
            active: true,
        }
    }

    #[test]
    fn test_active_employee_is_eligible() {
        assert!(employee().is_eligible_for(&period()));
    }

    #[test]
    fn test_inactive_employee_is_not_eligible() {
        let mut emp = employee();
        emp.active = false;
        assert!(!emp.is_eligible_for(&period()));
    }

    #[test]
    fn test_hired_after_period_is_not_eligible() {
        let mut emp = employee();
        emp.hired_on = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert!(!emp.is_eligible_for(&period()));
    }

    #[test]
    fn test_terminated_before_period_is_not_eligible() {
        let mut emp = employee();
        emp.terminated_on = Some(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert!(!emp.is_eligible_for(&period()));
    }

    #[test]
    fn test_terminated_on_first_day_is_eligible() {
        let mut emp = employee();
        emp.terminated_on = Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert!(emp.is_eligible_for(&period()));
    }

    #[test]
    fn test_deserialize_employee_defaults_active() {
        let json = r#"{
            "id": "emp_002",
            "tenant_id": "tenant_a",
            "name": "Grace Hopper",
            "base_pay": "4200.00",
            "hired_on": "2024-01-15"
        }"#;
        let emp: Employee = serde_json::from_str(json).unwrap();
        assert!(emp.active);
        assert!(emp.terminated_on.is_none());
        assert_eq!(emp.base_pay, Decimal::new(420000, 2));
    }

    #[test]
    fn test_input_kind_serializes_snake_case() {
        let json = serde_json::to_string(&InputKind::Deduction).unwrap();
        assert_eq!(json, "\"deduction\"");
    }
}
