//! Payroll period model and its status machine.
//!
//! This module contains the [`PayrollPeriod`] type and the [`PeriodStatus`]
//! enum whose transition rules every mutation of a period goes through.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The lifecycle status of a payroll period.
///
/// ```text
/// draft -> running -> reviewed -> finalized -> reopened
///            ^  |                                 |
///            +--+ (retry)                         +--> running (re-run)
/// ```
///
/// # Example
///
/// ```
/// use payroll_core::models::PeriodStatus;
///
/// assert!(PeriodStatus::Reviewed.can_transition_to(PeriodStatus::Finalized));
/// assert!(!PeriodStatus::Draft.can_transition_to(PeriodStatus::Finalized));
/// assert_eq!(PeriodStatus::Finalized.to_string(), "finalized");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodStatus {
    /// Created, nothing computed yet.
    Draft,
    /// The calculation engine is (or was last seen) computing results.
    Running,
    /// Results are computed and awaiting finalization.
    Reviewed,
    /// Payslips are authoritative. Immutable until reopened.
    Finalized,
    /// Administratively reopened after finalization.
    Reopened,
}

impl PeriodStatus {
    /// Returns the lowercase name used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodStatus::Draft => "draft",
            PeriodStatus::Running => "running",
            PeriodStatus::Reviewed => "reviewed",
            PeriodStatus::Finalized => "finalized",
            PeriodStatus::Reopened => "reopened",
        }
    }

    /// Parses the storage representation produced by [`PeriodStatus::as_str`].
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(PeriodStatus::Draft),
            "running" => Some(PeriodStatus::Running),
            "reviewed" => Some(PeriodStatus::Reviewed),
            "finalized" => Some(PeriodStatus::Finalized),
            "reopened" => Some(PeriodStatus::Reopened),
            _ => None,
        }
    }

    /// Returns true if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: PeriodStatus) -> bool {
        use PeriodStatus::*;
        matches!(
            (*self, next),
            (Draft, Running)
                | (Reopened, Running)
                | (Running, Running)
                | (Running, Reviewed)
                | (Reviewed, Finalized)
                | (Finalized, Reopened)
        )
    }

    /// Returns true if a calculation run may start from this status.
    pub fn can_run(&self) -> bool {
        self.can_transition_to(PeriodStatus::Running)
    }
}

impl fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One payroll run window for a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollPeriod {
    /// Unique identifier of the period.
    pub id: Uuid,
    /// The tenant that owns the period.
    pub tenant_id: String,
    /// The pay schedule this period belongs to.
    pub schedule_id: String,
    /// First day of the period (inclusive).
    pub start_date: NaiveDate,
    /// Last day of the period (inclusive).
    pub end_date: NaiveDate,
    /// Current lifecycle status.
    pub status: PeriodStatus,
    /// When the period was created.
    pub created_at: DateTime<Utc>,
    /// When the period was last mutated.
    pub updated_at: DateTime<Utc>,
    /// When the period was last finalized, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_at: Option<DateTime<Utc>>,
}

impl PayrollPeriod {
    /// Creates a new period in `draft`.
    pub fn new(
        tenant_id: impl Into<String>,
        schedule_id: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            schedule_id: schedule_id.into(),
            start_date,
            end_date,
            status: PeriodStatus::Draft,
            created_at: now,
            updated_at: now,
            finalized_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn january() -> PayrollPeriod {
        PayrollPeriod::new(
            "tenant_a",
            "monthly",
            NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
        )
    }

    #[test]
    fn test_new_period_is_draft() {
        let period = january();
        assert_eq!(period.status, PeriodStatus::Draft);
        assert!(period.finalized_at.is_none());
    }

    #[test]
    fn test_finalize_only_from_reviewed() {
        for status in [
            PeriodStatus::Draft,
            PeriodStatus::Running,
            PeriodStatus::Finalized,
            PeriodStatus::Reopened,
        ] {
            assert!(!status.can_transition_to(PeriodStatus::Finalized), "{status}");
        }
        assert!(PeriodStatus::Reviewed.can_transition_to(PeriodStatus::Finalized));
    }

    #[test]
    fn test_finalized_only_leaves_through_reopen() {
        assert!(PeriodStatus::Finalized.can_transition_to(PeriodStatus::Reopened));
        assert!(!PeriodStatus::Finalized.can_transition_to(PeriodStatus::Running));
        assert!(!PeriodStatus::Finalized.can_transition_to(PeriodStatus::Draft));
    }

    #[test]
    fn test_run_allowed_from_draft_reopened_and_running() {
        assert!(PeriodStatus::Draft.can_run());
        assert!(PeriodStatus::Reopened.can_run());
        assert!(PeriodStatus::Running.can_run());
        assert!(!PeriodStatus::Reviewed.can_run());
        assert!(!PeriodStatus::Finalized.can_run());
    }

    #[test]
    fn test_status_parse_matches_as_str() {
        for status in [
            PeriodStatus::Draft,
            PeriodStatus::Running,
            PeriodStatus::Reviewed,
            PeriodStatus::Finalized,
            PeriodStatus::Reopened,
        ] {
            assert_eq!(PeriodStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PeriodStatus::parse("closed"), None);
    }

    #[test]
    fn test_serialize_status_snake_case() {
        let json = serde_json::to_string(&PeriodStatus::Reviewed).unwrap();
        assert_eq!(json, "\"reviewed\"");
    }
}
