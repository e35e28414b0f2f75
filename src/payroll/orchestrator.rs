//! The payroll period state machine.
//!
//! Every transition runs inside a [`PeriodTransaction`], so the period row
//! lock, not process memory, serializes competing writers. The status is
//! always re-read under that lock before anything is written.
//!
//! [`PeriodTransaction`]: crate::store::PeriodTransaction

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use crate::calculation::PayrollCalculator;
use crate::error::{CoreError, CoreResult};
use crate::models::{PayrollPeriod, PayrollResult, Payslip, PeriodStatus};
use crate::store::PayrollStoreRef;

use super::SideEffects;

/// The committed result of a finalize.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    /// The period, now `finalized`.
    pub period: PayrollPeriod,
    /// One payslip per result row, in result order.
    pub payslips: Vec<Payslip>,
}

/// The committed result of a run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The period, now `reviewed`.
    pub period: PayrollPeriod,
    /// The result rows that replaced any earlier ones.
    pub results: Vec<PayrollResult>,
}

/// Drives payroll periods through their lifecycle.
#[derive(Clone)]
pub struct PayrollService {
    store: PayrollStoreRef,
    calculator: Arc<dyn PayrollCalculator>,
    effects: SideEffects,
    lock_timeout: Duration,
}

impl PayrollService {
    /// Creates a service.
    ///
    /// `lock_timeout` bounds how long any transition waits for the period
    /// row lock.
    pub fn new(
        store: PayrollStoreRef,
        calculator: Arc<dyn PayrollCalculator>,
        effects: SideEffects,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            calculator,
            effects,
            lock_timeout,
        }
    }

    /// Creates a `draft` period.
    pub async fn create_period(
        &self,
        tenant_id: &str,
        schedule_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> CoreResult<PayrollPeriod> {
        if schedule_id.trim().is_empty() {
            return Err(CoreError::validation("schedule_id must not be empty"));
        }
        if end_date < start_date {
            return Err(CoreError::validation(format!(
                "end_date {} is before start_date {}",
                end_date, start_date
            )));
        }

        let period = PayrollPeriod::new(tenant_id, schedule_id, start_date, end_date);
        self.store.insert_period(period.clone()).await?;
        info!(
            tenant_id = %tenant_id,
            period_id = %period.id,
            start_date = %start_date,
            end_date = %end_date,
            "Created payroll period"
        );
        Ok(period)
    }

    /// Reads a period.
    pub async fn get_period(&self, tenant_id: &str, period_id: Uuid) -> CoreResult<PayrollPeriod> {
        self.store
            .get_period(tenant_id, period_id)
            .await?
            .ok_or(CoreError::PeriodNotFound { period_id })
    }

    /// Lists a period's payslips, ordered by employee id.
    pub async fn list_payslips(
        &self,
        tenant_id: &str,
        period_id: Uuid,
    ) -> CoreResult<Vec<Payslip>> {
        self.get_period(tenant_id, period_id).await?;
        self.store.list_payslips(tenant_id, period_id).await
    }

    /// Computes results for every eligible employee and moves the period to
    /// `reviewed`.
    ///
    /// Allowed from `draft`, `reopened` and `running`. The calculation runs
    /// between two short transactions so the row lock is not held while it
    /// computes. If the calculation fails the period stays `running`.
    pub async fn run(&self, tenant_id: &str, period_id: Uuid) -> CoreResult<RunOutcome> {
        let started = Instant::now();

        let mut tx = self
            .store
            .lock_period(tenant_id, period_id, self.lock_timeout)
            .await?;
        let status = tx.period().status;
        if !status.can_run() {
            return Err(invalid_state(
                period_id,
                status,
                "run requires a draft, reopened or running period",
            ));
        }
        tx.set_status(PeriodStatus::Running).await?;
        let period = tx.commit().await?;

        let employees = self.store.list_employees(tenant_id).await?;
        let inputs = self.store.list_inputs(tenant_id, period_id).await?;
        let results = match self.calculator.calculate(&period, &employees, &inputs) {
            Ok(results) => results,
            Err(err) => {
                warn!(
                    tenant_id = %tenant_id,
                    period_id = %period_id,
                    error = %err,
                    "Payroll calculation failed; period left running"
                );
                return Err(err);
            }
        };

        let mut tx = self
            .store
            .lock_period(tenant_id, period_id, self.lock_timeout)
            .await?;
        let status = tx.period().status;
        if status != PeriodStatus::Running {
            return Err(invalid_state(period_id, status, "period changed while calculating"));
        }
        tx.replace_results(results.clone()).await?;
        tx.set_status(PeriodStatus::Reviewed).await?;
        let period = tx.commit().await?;

        info!(
            tenant_id = %tenant_id,
            period_id = %period_id,
            results = results.len(),
            duration_us = started.elapsed().as_micros() as u64,
            "Payroll run complete"
        );
        Ok(RunOutcome { period, results })
    }

    /// Turns a `reviewed` period's results into payslips exactly once.
    ///
    /// Payslips and the status change commit together or not at all.
    /// Rendering and notification are dispatched only after the commit and
    /// cannot fail the call.
    pub async fn finalize(&self, tenant_id: &str, period_id: Uuid) -> CoreResult<FinalizeOutcome> {
        let started = Instant::now();

        let mut tx = self
            .store
            .lock_period(tenant_id, period_id, self.lock_timeout)
            .await?;

        let status = tx.period().status;
        if status != PeriodStatus::Reviewed {
            return Err(invalid_state(period_id, status, "finalize requires a reviewed period"));
        }

        let results = tx.results().await?;
        if results.is_empty() {
            return Err(invalid_state(period_id, status, "period has no computed results"));
        }

        let mut payslips = Vec::with_capacity(results.len());
        for result in &results {
            payslips.push(tx.upsert_payslip(result).await?);
        }
        // Employees dropped by a re-run after reopen lose their payslip.
        let employee_ids: Vec<String> = results.iter().map(|r| r.employee_id.clone()).collect();
        let removed = tx.retain_payslips(&employee_ids).await?;
        tx.set_status(PeriodStatus::Finalized).await?;
        let period = tx.commit().await?;

        info!(
            tenant_id = %tenant_id,
            period_id = %period_id,
            payslips = payslips.len(),
            removed_payslips = removed,
            duration_us = started.elapsed().as_micros() as u64,
            "Payroll period finalized"
        );

        self.effects.dispatch(period_id, payslips.clone());
        Ok(FinalizeOutcome { period, payslips })
    }

    /// Moves a `finalized` period to `reopened`.
    ///
    /// Existing payslips are kept; the next finalize updates them in place.
    pub async fn reopen(&self, tenant_id: &str, period_id: Uuid) -> CoreResult<PayrollPeriod> {
        let mut tx = self
            .store
            .lock_period(tenant_id, period_id, self.lock_timeout)
            .await?;
        let status = tx.period().status;
        if !status.can_transition_to(PeriodStatus::Reopened) {
            return Err(invalid_state(period_id, status, "reopen requires a finalized period"));
        }
        tx.set_status(PeriodStatus::Reopened).await?;
        let period = tx.commit().await?;

        info!(tenant_id = %tenant_id, period_id = %period_id, "Payroll period reopened");
        Ok(period)
    }

    /// Re-renders one payslip's document. Financial state is not touched.
    pub async fn regenerate_payslip(
        &self,
        tenant_id: &str,
        payslip_id: Uuid,
    ) -> CoreResult<Payslip> {
        let payslip = self
            .store
            .get_payslip(tenant_id, payslip_id)
            .await?
            .ok_or(CoreError::PayslipNotFound { payslip_id })?;

        let period = self.get_period(tenant_id, payslip.period_id).await?;
        if period.status != PeriodStatus::Finalized {
            return Err(invalid_state(
                period.id,
                period.status,
                "payslips can only be regenerated for a finalized period",
            ));
        }

        self.effects.render(&payslip).await?;
        info!(tenant_id = %tenant_id, payslip_id = %payslip_id, "Payslip regenerated");
        Ok(payslip)
    }
}

fn invalid_state(period_id: Uuid, status: PeriodStatus, message: &str) -> CoreError {
    CoreError::InvalidState {
        period_id,
        status,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::NetPayCalculator;
    use crate::config::SideEffectsConfig;
    use crate::models::Employee;
    use crate::payroll::{LogNotifier, PayslipRenderer};
    use crate::store::{MemoryStore, PayrollStore};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};

    const TENANT: &str = "tenant_a";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn employee(id: &str, base_cents: i64) -> Employee {
        Employee {
            id: id.to_string(),
            tenant_id: TENANT.to_string(),
            name: format!("Employee {}", id),
            base_pay: Decimal::new(base_cents, 2),
            hired_on: date(2024, 1, 1),
            terminated_on: None,
            active: true,
        }
    }

    fn service_with(
        store: &MemoryStore,
        effects: SideEffects,
        timeout: Duration,
    ) -> PayrollService {
        PayrollService::new(
            Arc::new(store.clone()),
            Arc::new(NetPayCalculator),
            effects,
            timeout,
        )
    }

    fn service(store: &MemoryStore) -> PayrollService {
        service_with(
            store,
            SideEffects::logging(&SideEffectsConfig::default()),
            Duration::from_secs(5),
        )
    }

    async fn reviewed_period(store: &MemoryStore, svc: &PayrollService) -> PayrollPeriod {
        store.insert_employee(employee("emp_001", 500000)).await;
        let period = svc
            .create_period(TENANT, "monthly", date(2026, 1, 1), date(2026, 1, 31))
            .await
            .unwrap();
        svc.run(TENANT, period.id).await.unwrap().period
    }

    #[tokio::test]
    async fn test_create_period_rejects_inverted_dates() {
        let store = MemoryStore::new();
        let err = service(&store)
            .create_period(TENANT, "monthly", date(2026, 1, 31), date(2026, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_run_moves_draft_to_reviewed() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let period = reviewed_period(&store, &svc).await;

        assert_eq!(period.status, PeriodStatus::Reviewed);
        assert_eq!(store.list_results(TENANT, period.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_replaces_results() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let period = reviewed_period(&store, &svc).await;
        svc.finalize(TENANT, period.id).await.unwrap();
        svc.reopen(TENANT, period.id).await.unwrap();

        let rerun = svc.run(TENANT, period.id).await.unwrap();
        assert_eq!(rerun.period.status, PeriodStatus::Reviewed);
        assert_eq!(store.list_results(TENANT, period.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_rejected_from_reviewed() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let period = reviewed_period(&store, &svc).await;

        let err = svc.run(TENANT, period.id).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidState {
                status: PeriodStatus::Reviewed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_failed_calculation_leaves_period_running() {
        let store = MemoryStore::new();
        let svc = service(&store);
        store.insert_employee(employee("emp_bad", -100)).await;
        let period = svc
            .create_period(TENANT, "monthly", date(2026, 1, 1), date(2026, 1, 31))
            .await
            .unwrap();

        let err = svc.run(TENANT, period.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Calculation { .. }));
        assert_eq!(
            svc.get_period(TENANT, period.id).await.unwrap().status,
            PeriodStatus::Running
        );
    }

    #[tokio::test]
    async fn test_finalize_creates_one_payslip_per_result() {
        let store = MemoryStore::new();
        let svc = service(&store);
        store.insert_employee(employee("emp_002", 420000)).await;
        let period = reviewed_period(&store, &svc).await;

        let outcome = svc.finalize(TENANT, period.id).await.unwrap();
        assert_eq!(outcome.period.status, PeriodStatus::Finalized);
        assert_eq!(outcome.payslips.len(), 2);
        assert_eq!(svc.list_payslips(TENANT, period.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_second_finalize_is_invalid_state() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let period = reviewed_period(&store, &svc).await;

        svc.finalize(TENANT, period.id).await.unwrap();
        let err = svc.finalize(TENANT, period.id).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidState {
                status: PeriodStatus::Finalized,
                ..
            }
        ));
        assert_eq!(svc.list_payslips(TENANT, period.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_finalize_draft_is_invalid_state() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let period = svc
            .create_period(TENANT, "monthly", date(2026, 1, 1), date(2026, 1, 31))
            .await
            .unwrap();

        let err = svc.finalize(TENANT, period.id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
        assert_eq!(
            svc.get_period(TENANT, period.id).await.unwrap().status,
            PeriodStatus::Draft
        );
    }

    #[tokio::test]
    async fn test_empty_reviewed_period_stays_reviewed() {
        let store = MemoryStore::new();
        let svc = service(&store);
        // No employees: the run succeeds with zero results.
        let period = svc
            .create_period(TENANT, "monthly", date(2026, 1, 1), date(2026, 1, 31))
            .await
            .unwrap();
        svc.run(TENANT, period.id).await.unwrap();

        let err = svc.finalize(TENANT, period.id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
        assert_eq!(
            svc.get_period(TENANT, period.id).await.unwrap().status,
            PeriodStatus::Reviewed
        );
        assert!(svc.list_payslips(TENANT, period.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_tenant_sees_not_found() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let period = reviewed_period(&store, &svc).await;

        let err = svc.finalize("tenant_b", period.id).await.unwrap_err();
        assert!(matches!(err, CoreError::PeriodNotFound { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_finalize_has_exactly_one_winner() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let period = reviewed_period(&store, &svc).await;

        let period_id = period.id;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let svc = svc.clone();
            handles.push(tokio::spawn(
                async move { svc.finalize(TENANT, period_id).await },
            ));
        }

        let mut successes = 0;
        let mut invalid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(CoreError::InvalidState { .. }) => invalid += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(invalid, 7);
        assert_eq!(svc.list_payslips(TENANT, period.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lock_wait_is_bounded() {
        let store = MemoryStore::new();
        let svc = service_with(
            &store,
            SideEffects::logging(&SideEffectsConfig::default()),
            Duration::from_millis(20),
        );
        let period = reviewed_period(&store, &svc).await;

        let _held = store
            .lock_period(TENANT, period.id, Duration::from_secs(1))
            .await
            .unwrap();
        let err = svc.finalize(TENANT, period.id).await.unwrap_err();
        assert!(matches!(err, CoreError::LockTimeout { .. }));
        assert_eq!(
            svc.get_period(TENANT, period.id).await.unwrap().status,
            PeriodStatus::Reviewed
        );
    }

    struct BrokenRenderer {
        calls: AtomicU32,
    }

    #[async_trait]
    impl PayslipRenderer for BrokenRenderer {
        async fn render(&self, _payslip: &Payslip) -> CoreResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::storage("renderer offline"))
        }
    }

    #[tokio::test]
    async fn test_render_failure_does_not_fail_finalize() {
        let store = MemoryStore::new();
        let renderer = Arc::new(BrokenRenderer {
            calls: AtomicU32::new(0),
        });
        let config = SideEffectsConfig {
            render_max_attempts: 2,
            retry_backoff_ms: 1,
        };
        let svc = service_with(
            &store,
            SideEffects::new(renderer.clone(), Arc::new(LogNotifier), &config),
            Duration::from_secs(5),
        );
        let period = reviewed_period(&store, &svc).await;

        let outcome = svc.finalize(TENANT, period.id).await.unwrap();
        assert_eq!(outcome.period.status, PeriodStatus::Finalized);

        // Regenerate surfaces the renderer failure without touching state.
        let err = svc
            .regenerate_payslip(TENANT, outcome.payslips[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Rendering { .. }));
        assert_eq!(
            svc.get_period(TENANT, period.id).await.unwrap().status,
            PeriodStatus::Finalized
        );
    }

    #[tokio::test]
    async fn test_reopen_requires_finalized() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let period = reviewed_period(&store, &svc).await;

        assert!(matches!(
            svc.reopen(TENANT, period.id).await.unwrap_err(),
            CoreError::InvalidState { .. }
        ));
        svc.finalize(TENANT, period.id).await.unwrap();
        let reopened = svc.reopen(TENANT, period.id).await.unwrap();
        assert_eq!(reopened.status, PeriodStatus::Reopened);
    }

    #[tokio::test]
    async fn test_refinalize_after_reopen_updates_payslips_in_place() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let period = reviewed_period(&store, &svc).await;
        let first = svc.finalize(TENANT, period.id).await.unwrap();

        svc.reopen(TENANT, period.id).await.unwrap();
        svc.run(TENANT, period.id).await.unwrap();
        let second = svc.finalize(TENANT, period.id).await.unwrap();

        assert_eq!(second.payslips.len(), 1);
        assert_eq!(second.payslips[0].id, first.payslips[0].id);
    }

    #[tokio::test]
    async fn test_refinalize_removes_payslips_of_dropped_employees() {
        let store = MemoryStore::new();
        let svc = service(&store);
        store.insert_employee(employee("emp_002", 420000)).await;
        let period = reviewed_period(&store, &svc).await;
        assert_eq!(svc.finalize(TENANT, period.id).await.unwrap().payslips.len(), 2);

        svc.reopen(TENANT, period.id).await.unwrap();
        let mut departed = employee("emp_002", 420000);
        departed.active = false;
        store.insert_employee(departed).await;
        assert_eq!(svc.run(TENANT, period.id).await.unwrap().results.len(), 1);
        let outcome = svc.finalize(TENANT, period.id).await.unwrap();

        let stored = svc.list_payslips(TENANT, period.id).await.unwrap();
        assert_eq!(stored.len(), outcome.payslips.len());
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].employee_id, "emp_001");
    }

    #[tokio::test]
    async fn test_regenerate_requires_finalized_period() {
        let store = MemoryStore::new();
        let svc = service(&store);
        let period = reviewed_period(&store, &svc).await;
        let payslip = svc.finalize(TENANT, period.id).await.unwrap().payslips[0].clone();
        svc.reopen(TENANT, period.id).await.unwrap();

        let err = svc.regenerate_payslip(TENANT, payslip.id).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_regenerate_unknown_payslip_is_not_found() {
        let store = MemoryStore::new();
        let err = service(&store)
            .regenerate_payslip(TENANT, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PayslipNotFound { .. }));
    }
}
