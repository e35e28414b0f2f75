//! Process-local storage backend.
//!
//! Every period row has its own async mutex standing in for the database
//! row lock. Writes made through a [`PeriodTransaction`] are staged on the
//! transaction and applied to the shared tables in one step at commit.
//! Suitable for tests and single-instance deployments only: the locks and
//! the idempotency map do not extend beyond this process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::{
    Employee, IdempotencyRecord, IdempotencyScope, PayrollInput, PayrollPeriod, PayrollResult,
    Payslip, PeriodStatus,
};

use super::{IdempotencyStore, PayrollStore, PeriodTransaction, SaveOutcome};

#[derive(Debug, Default)]
struct Tables {
    periods: HashMap<Uuid, PayrollPeriod>,
    employees: HashMap<(String, String), Employee>,
    inputs: Vec<PayrollInput>,
    results: HashMap<Uuid, Vec<PayrollResult>>,
    payslips: HashMap<(Uuid, String), Payslip>,
}

/// A thread-safe in-memory implementation of both storage ports.
///
/// Cloning yields another handle to the same data.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    row_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
    idempotency: Arc<RwLock<HashMap<IdempotencyScope, IdempotencyRecord>>>,
}

impl MemoryStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an employee record.
    pub async fn insert_employee(&self, employee: Employee) {
        let mut tables = self.tables.write().await;
        tables
            .employees
            .insert((employee.tenant_id.clone(), employee.id.clone()), employee);
    }

    /// Records a payroll input against a period.
    pub async fn insert_input(&self, input: PayrollInput) {
        self.tables.write().await.inputs.push(input);
    }

    /// Returns the period's row lock, creating it on first use.
    ///
    /// Entries that no transaction holds or waits on are pruned here.
    async fn row_lock(&self, period_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.row_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(period_id).or_default().clone()
    }
}

#[async_trait]
impl PayrollStore for MemoryStore {
    async fn insert_period(&self, period: PayrollPeriod) -> CoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.periods.contains_key(&period.id) {
            return Err(CoreError::storage(format!(
                "period {} already exists",
                period.id
            )));
        }
        tables.periods.insert(period.id, period);
        Ok(())
    }

    async fn get_period(
        &self,
        tenant_id: &str,
        period_id: Uuid,
    ) -> CoreResult<Option<PayrollPeriod>> {
        let tables = self.tables.read().await;
        Ok(tables
            .periods
            .get(&period_id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_employees(&self, tenant_id: &str) -> CoreResult<Vec<Employee>> {
        let tables = self.tables.read().await;
        let mut employees: Vec<Employee> = tables
            .employees
            .values()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect();
        employees.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(employees)
    }

    async fn list_inputs(&self, tenant_id: &str, period_id: Uuid) -> CoreResult<Vec<PayrollInput>> {
        let tables = self.tables.read().await;
        Ok(tables
            .inputs
            .iter()
            .filter(|i| i.tenant_id == tenant_id && i.period_id == period_id)
            .cloned()
            .collect())
    }

    async fn list_results(
        &self,
        tenant_id: &str,
        period_id: Uuid,
    ) -> CoreResult<Vec<PayrollResult>> {
        let tables = self.tables.read().await;
        Ok(tables
            .results
            .get(&period_id)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.tenant_id == tenant_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_payslips(&self, tenant_id: &str, period_id: Uuid) -> CoreResult<Vec<Payslip>> {
        let tables = self.tables.read().await;
        let mut payslips: Vec<Payslip> = tables
            .payslips
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.period_id == period_id)
            .cloned()
            .collect();
        payslips.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));
        Ok(payslips)
    }

    async fn get_payslip(&self, tenant_id: &str, payslip_id: Uuid) -> CoreResult<Option<Payslip>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payslips
            .values()
            .find(|p| p.id == payslip_id && p.tenant_id == tenant_id)
            .cloned())
    }

    async fn lock_period(
        &self,
        tenant_id: &str,
        period_id: Uuid,
        lock_timeout: Duration,
    ) -> CoreResult<Box<dyn PeriodTransaction>> {
        if self.get_period(tenant_id, period_id).await?.is_none() {
            return Err(CoreError::PeriodNotFound { period_id });
        }

        let lock = self.row_lock(period_id).await;
        let started = Instant::now();
        let guard = tokio::time::timeout(lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| CoreError::LockTimeout {
                period_id,
                waited_ms: lock_timeout.as_millis() as u64,
            })?;
        debug!(
            period_id = %period_id,
            waited_us = started.elapsed().as_micros() as u64,
            "Acquired period row lock"
        );

        // Re-read under the lock; the unlocked read above may be stale.
        let period = self
            .get_period(tenant_id, period_id)
            .await?
            .ok_or(CoreError::PeriodNotFound { period_id })?;

        Ok(Box::new(MemoryTransaction {
            tables: Arc::clone(&self.tables),
            _guard: guard,
            period,
            staged_results: None,
            staged_payslips: Vec::new(),
            retained_employees: None,
        }))
    }
}

struct MemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    _guard: OwnedMutexGuard<()>,
    period: PayrollPeriod,
    staged_results: Option<Vec<PayrollResult>>,
    staged_payslips: Vec<Payslip>,
    retained_employees: Option<Vec<String>>,
}

#[async_trait]
impl PeriodTransaction for MemoryTransaction {
    fn period(&self) -> &PayrollPeriod {
        &self.period
    }

    async fn results(&mut self) -> CoreResult<Vec<PayrollResult>> {
        if let Some(staged) = &self.staged_results {
            return Ok(staged.clone());
        }
        let tables = self.tables.read().await;
        Ok(tables
            .results
            .get(&self.period.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_results(&mut self, results: Vec<PayrollResult>) -> CoreResult<()> {
        if let Some(foreign) = results.iter().find(|r| r.period_id != self.period.id) {
            return Err(CoreError::storage(format!(
                "result {} belongs to period {}, not {}",
                foreign.id, foreign.period_id, self.period.id
            )));
        }
        self.staged_results = Some(results);
        Ok(())
    }

    async fn upsert_payslip(&mut self, result: &PayrollResult) -> CoreResult<Payslip> {
        if let Some(staged) = self
            .staged_payslips
            .iter_mut()
            .find(|p| p.employee_id == result.employee_id)
        {
            staged.apply_result(result);
            return Ok(staged.clone());
        }

        let existing = {
            let tables = self.tables.read().await;
            tables
                .payslips
                .get(&(self.period.id, result.employee_id.clone()))
                .cloned()
        };
        let payslip = match existing {
            Some(mut payslip) => {
                payslip.apply_result(result);
                payslip
            }
            None => Payslip::from_result(result),
        };
        self.staged_payslips.push(payslip.clone());
        Ok(payslip)
    }

    async fn retain_payslips(&mut self, employee_ids: &[String]) -> CoreResult<u64> {
        self.staged_payslips.retain(|p| employee_ids.contains(&p.employee_id));

        let removed = {
            let tables = self.tables.read().await;
            tables
                .payslips
                .keys()
                .filter(|(period_id, employee_id)| {
                    *period_id == self.period.id && !employee_ids.contains(employee_id)
                })
                .count() as u64
        };
        self.retained_employees = Some(employee_ids.to_vec());
        Ok(removed)
    }

    async fn set_status(&mut self, status: PeriodStatus) -> CoreResult<()> {
        let now = Utc::now();
        self.period.status = status;
        self.period.updated_at = now;
        if status == PeriodStatus::Finalized {
            self.period.finalized_at = Some(now);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<PayrollPeriod> {
        let MemoryTransaction {
            tables,
            _guard,
            period,
            staged_results,
            staged_payslips,
            retained_employees,
        } = *self;

        let mut tables = tables.write().await;
        tables.periods.insert(period.id, period.clone());
        if let Some(results) = staged_results {
            tables.results.insert(period.id, results);
        }
        if let Some(keep) = retained_employees {
            tables.payslips.retain(|(period_id, employee_id), _| {
                *period_id != period.id || keep.contains(employee_id)
            });
        }
        for payslip in staged_payslips {
            tables
                .payslips
                .insert((payslip.period_id, payslip.employee_id.clone()), payslip);
        }
        Ok(period)
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn find(&self, scope: &IdempotencyScope) -> CoreResult<Option<IdempotencyRecord>> {
        Ok(self.idempotency.read().await.get(scope).cloned())
    }

    async fn save(&self, record: IdempotencyRecord) -> CoreResult<SaveOutcome> {
        let mut records = self.idempotency.write().await;
        match records.get(&record.scope) {
            Some(existing) if existing.fingerprint == record.fingerprint => {
                Ok(SaveOutcome::Matched(existing.clone()))
            }
            Some(existing) => Ok(SaveOutcome::Conflict(existing.clone())),
            None => {
                records.insert(record.scope.clone(), record);
                Ok(SaveOutcome::Inserted)
            }
        }
    }
}
