//! Storage ports and backends.
//!
//! The orchestrator and the idempotency gate only see the traits in this
//! module. [`MemoryStore`] backs a single process; `PgStore` (feature
//! `postgres`) backs a fleet of instances sharing one database.
//!
//! A [`PeriodTransaction`] holds the exclusive row lock on one period from
//! [`PayrollStore::lock_period`] until it is committed or dropped. Writes
//! made through it become visible only on [`PeriodTransaction::commit`];
//! dropping it without committing rolls everything back.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::CoreResult;
use crate::models::{
    Employee, IdempotencyRecord, IdempotencyScope, PayrollInput, PayrollPeriod, PayrollResult,
    Payslip, PeriodStatus,
};

/// Persistence for periods, their inputs, results and payslips.
#[async_trait]
pub trait PayrollStore: Send + Sync {
    /// Inserts a new period.
    async fn insert_period(&self, period: PayrollPeriod) -> CoreResult<()>;

    /// Reads a period without locking it.
    async fn get_period(&self, tenant_id: &str, period_id: Uuid)
    -> CoreResult<Option<PayrollPeriod>>;

    /// Lists the tenant's employees.
    async fn list_employees(&self, tenant_id: &str) -> CoreResult<Vec<Employee>>;

    /// Lists the inputs recorded against a period.
    async fn list_inputs(&self, tenant_id: &str, period_id: Uuid) -> CoreResult<Vec<PayrollInput>>;

    /// Lists the computed results of a period.
    async fn list_results(&self, tenant_id: &str, period_id: Uuid)
    -> CoreResult<Vec<PayrollResult>>;

    /// Lists the payslips of a period, ordered by employee id.
    async fn list_payslips(&self, tenant_id: &str, period_id: Uuid) -> CoreResult<Vec<Payslip>>;

    /// Reads one payslip.
    async fn get_payslip(&self, tenant_id: &str, payslip_id: Uuid) -> CoreResult<Option<Payslip>>;

    /// Opens a transaction holding the exclusive lock on the period row.
    ///
    /// Waits at most `lock_timeout` for the lock. Fails with
    /// `PeriodNotFound` if the period does not exist for the tenant and with
    /// `LockTimeout` if the wait is exceeded.
    async fn lock_period(
        &self,
        tenant_id: &str,
        period_id: Uuid,
        lock_timeout: Duration,
    ) -> CoreResult<Box<dyn PeriodTransaction>>;
}

/// An open transaction scoped to one locked period row.
#[async_trait]
pub trait PeriodTransaction: Send {
    /// The period as read while holding the lock, including staged changes.
    fn period(&self) -> &PayrollPeriod;

    /// Reads the period's computed results, including staged changes.
    async fn results(&mut self) -> CoreResult<Vec<PayrollResult>>;

    /// Replaces all of the period's results.
    async fn replace_results(&mut self, results: Vec<PayrollResult>) -> CoreResult<()>;

    /// Inserts the payslip for the result's (period, employee) pair, or
    /// updates it in place if one exists.
    async fn upsert_payslip(&mut self, result: &PayrollResult) -> CoreResult<Payslip>;

    /// Deletes the period's payslips whose employee is not in
    /// `employee_ids`, returning how many were removed.
    async fn retain_payslips(&mut self, employee_ids: &[String]) -> CoreResult<u64>;

    /// Moves the period to `status`.
    async fn set_status(&mut self, status: PeriodStatus) -> CoreResult<()>;

    /// Makes every staged write visible atomically and releases the lock.
    async fn commit(self: Box<Self>) -> CoreResult<PayrollPeriod>;
}

/// Outcome of persisting an idempotency record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// No record existed; this one is now canonical.
    Inserted,
    /// A record with the same fingerprint was already committed.
    Matched(IdempotencyRecord),
    /// A record with a different fingerprint was already committed.
    Conflict(IdempotencyRecord),
}

/// Persistence for idempotency records, unique on [`IdempotencyScope`].
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Looks up the committed record for a scope.
    async fn find(&self, scope: &IdempotencyScope) -> CoreResult<Option<IdempotencyRecord>>;

    /// Inserts `record` unless one already exists for its scope.
    ///
    /// An existing record is never overwritten.
    async fn save(&self, record: IdempotencyRecord) -> CoreResult<SaveOutcome>;
}

/// Shared handle to a payroll store.
pub type PayrollStoreRef = Arc<dyn PayrollStore>;

/// Shared handle to an idempotency store.
pub type IdempotencyStoreRef = Arc<dyn IdempotencyStore>;
