//! PostgreSQL storage backend.
//!
//! The period row lock is `SELECT ... FOR UPDATE` inside a database
//! transaction, bounded by `SET LOCAL lock_timeout`. The database, not this
//! process, orders competing finalize attempts, so any number of service
//! instances may share one database.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, Transaction};
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::models::{
    Employee, IdempotencyRecord, IdempotencyScope, InputKind, PayLine, PayrollInput,
    PayrollPeriod, PayrollResult, Payslip, PeriodStatus, StoredResponse,
};

use super::{IdempotencyStore, PayrollStore, PeriodTransaction, SaveOutcome};

const SCHEMA: &str = include_str!("../../migrations/0001_payroll_core.sql");

/// SQLSTATE raised when `lock_timeout` expires.
const LOCK_NOT_AVAILABLE: &str = "55P03";

const PERIOD_COLUMNS: &str = "id, tenant_id, schedule_id, start_date, end_date, status, \
     created_at, updated_at, finalized_at";

const RESULT_COLUMNS: &str = "id, tenant_id, period_id, employee_id, employee_name, gross_pay, \
     total_deductions, net_pay, lines, computed_at";

const PAYSLIP_COLUMNS: &str = "id, tenant_id, period_id, employee_id, employee_name, gross_pay, \
     total_deductions, net_pay, lines, created_at, updated_at";

/// Both storage ports backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects a pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> CoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(db_error)?;
        Ok(Self { pool })
    }

    /// Creates the schema if it does not exist.
    pub async fn migrate(&self) -> CoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

fn db_error(err: sqlx::Error) -> CoreError {
    error!(error = %err, "Database error");
    CoreError::storage(err.to_string())
}

fn is_lock_timeout(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE))
}

#[derive(FromRow)]
struct PeriodRow {
    id: Uuid,
    tenant_id: String,
    schedule_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl TryFrom<PeriodRow> for PayrollPeriod {
    type Error = CoreError;

    fn try_from(row: PeriodRow) -> CoreResult<Self> {
        let status = PeriodStatus::parse(&row.status)
            .ok_or_else(|| CoreError::storage(format!("unknown period status '{}'", row.status)))?;
        Ok(PayrollPeriod {
            id: row.id,
            tenant_id: row.tenant_id,
            schedule_id: row.schedule_id,
            start_date: row.start_date,
            end_date: row.end_date,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            finalized_at: row.finalized_at,
        })
    }
}

#[derive(FromRow)]
struct EmployeeRow {
    id: String,
    tenant_id: String,
    name: String,
    base_pay: Decimal,
    hired_on: NaiveDate,
    terminated_on: Option<NaiveDate>,
    active: bool,
}

impl From<EmployeeRow> for Employee {
    fn from(row: EmployeeRow) -> Self {
        Employee {
            id: row.id,
            tenant_id: row.tenant_id,
            name: row.name,
            base_pay: row.base_pay,
            hired_on: row.hired_on,
            terminated_on: row.terminated_on,
            active: row.active,
        }
    }
}

#[derive(FromRow)]
struct InputRow {
    id: Uuid,
    tenant_id: String,
    period_id: Uuid,
    employee_id: String,
    kind: String,
    code: String,
    amount: Decimal,
}

impl TryFrom<InputRow> for PayrollInput {
    type Error = CoreError;

    fn try_from(row: InputRow) -> CoreResult<Self> {
        let kind = match row.kind.as_str() {
            "earning" => InputKind::Earning,
            "deduction" => InputKind::Deduction,
            other => return Err(CoreError::storage(format!("unknown input kind '{}'", other))),
        };
        Ok(PayrollInput {
            id: row.id,
            tenant_id: row.tenant_id,
            period_id: row.period_id,
            employee_id: row.employee_id,
            kind,
            code: row.code,
            amount: row.amount,
        })
    }
}

#[derive(FromRow)]
struct ResultRow {
    id: Uuid,
    tenant_id: String,
    period_id: Uuid,
    employee_id: String,
    employee_name: String,
    gross_pay: Decimal,
    total_deductions: Decimal,
    net_pay: Decimal,
    lines: Json<Vec<PayLine>>,
    computed_at: DateTime<Utc>,
}

impl From<ResultRow> for PayrollResult {
    fn from(row: ResultRow) -> Self {
        PayrollResult {
            id: row.id,
            tenant_id: row.tenant_id,
            period_id: row.period_id,
            employee_id: row.employee_id,
            employee_name: row.employee_name,
            gross_pay: row.gross_pay,
            total_deductions: row.total_deductions,
            net_pay: row.net_pay,
            lines: row.lines.0,
            computed_at: row.computed_at,
        }
    }
}

#[derive(FromRow)]
struct PayslipRow {
    id: Uuid,
    tenant_id: String,
    period_id: Uuid,
    employee_id: String,
    employee_name: String,
    gross_pay: Decimal,
    total_deductions: Decimal,
    net_pay: Decimal,
    lines: Json<Vec<PayLine>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PayslipRow> for Payslip {
    fn from(row: PayslipRow) -> Self {
        Payslip {
            id: row.id,
            tenant_id: row.tenant_id,
            period_id: row.period_id,
            employee_id: row.employee_id,
            employee_name: row.employee_name,
            gross_pay: row.gross_pay,
            total_deductions: row.total_deductions,
            net_pay: row.net_pay,
            lines: row.lines.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct RecordRow {
    tenant_id: String,
    user_id: String,
    idem_key: String,
    endpoint: String,
    request_hash: String,
    response_status: i32,
    response_content_type: Option<String>,
    response_body: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for IdempotencyRecord {
    type Error = CoreError;

    fn try_from(row: RecordRow) -> CoreResult<Self> {
        let status = u16::try_from(row.response_status).map_err(|_| {
            CoreError::storage(format!("invalid stored status {}", row.response_status))
        })?;
        Ok(IdempotencyRecord {
            scope: IdempotencyScope {
                tenant_id: row.tenant_id,
                user_id: row.user_id,
                key: row.idem_key,
                endpoint: row.endpoint,
            },
            fingerprint: row.request_hash,
            response: StoredResponse {
                status,
                content_type: row.response_content_type,
                body: row.response_body,
            },
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl PayrollStore for PgStore {
    async fn insert_period(&self, period: PayrollPeriod) -> CoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO payroll_periods ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            PERIOD_COLUMNS
        ))
        .bind(period.id)
        .bind(&period.tenant_id)
        .bind(&period.schedule_id)
        .bind(period.start_date)
        .bind(period.end_date)
        .bind(period.status.as_str())
        .bind(period.created_at)
        .bind(period.updated_at)
        .bind(period.finalized_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_period(
        &self,
        tenant_id: &str,
        period_id: Uuid,
    ) -> CoreResult<Option<PayrollPeriod>> {
        let row = sqlx::query_as::<_, PeriodRow>(&format!(
            "SELECT {} FROM payroll_periods WHERE id = $1 AND tenant_id = $2",
            PERIOD_COLUMNS
        ))
        .bind(period_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(PayrollPeriod::try_from).transpose()
    }

    async fn list_employees(&self, tenant_id: &str) -> CoreResult<Vec<Employee>> {
        let rows = sqlx::query_as::<_, EmployeeRow>(
            "SELECT id, tenant_id, name, base_pay, hired_on, terminated_on, active \
             FROM employees WHERE tenant_id = $1 ORDER BY id",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(Employee::from).collect())
    }

    async fn list_inputs(&self, tenant_id: &str, period_id: Uuid) -> CoreResult<Vec<PayrollInput>> {
        let rows = sqlx::query_as::<_, InputRow>(
            "SELECT id, tenant_id, period_id, employee_id, kind, code, amount \
             FROM payroll_inputs WHERE tenant_id = $1 AND period_id = $2 \
             ORDER BY employee_id, code",
        )
        .bind(tenant_id)
        .bind(period_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.into_iter().map(PayrollInput::try_from).collect()
    }

    async fn list_results(
        &self,
        tenant_id: &str,
        period_id: Uuid,
    ) -> CoreResult<Vec<PayrollResult>> {
        let rows = sqlx::query_as::<_, ResultRow>(&format!(
            "SELECT {} FROM payroll_results \
             WHERE tenant_id = $1 AND period_id = $2 ORDER BY employee_id",
            RESULT_COLUMNS
        ))
        .bind(tenant_id)
        .bind(period_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(PayrollResult::from).collect())
    }

    async fn list_payslips(&self, tenant_id: &str, period_id: Uuid) -> CoreResult<Vec<Payslip>> {
        let rows = sqlx::query_as::<_, PayslipRow>(&format!(
            "SELECT {} FROM payslips WHERE tenant_id = $1 AND period_id = $2 ORDER BY employee_id",
            PAYSLIP_COLUMNS
        ))
        .bind(tenant_id)
        .bind(period_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(Payslip::from).collect())
    }

    async fn get_payslip(&self, tenant_id: &str, payslip_id: Uuid) -> CoreResult<Option<Payslip>> {
        let row = sqlx::query_as::<_, PayslipRow>(&format!(
            "SELECT {} FROM payslips WHERE tenant_id = $1 AND id = $2",
            PAYSLIP_COLUMNS
        ))
        .bind(tenant_id)
        .bind(payslip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(row.map(Payslip::from))
    }

    async fn lock_period(
        &self,
        tenant_id: &str,
        period_id: Uuid,
        lock_timeout: Duration,
    ) -> CoreResult<Box<dyn PeriodTransaction>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        // SET does not accept bind parameters; the value is a plain integer.
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let row = sqlx::query_as::<_, PeriodRow>(&format!(
            "SELECT {} FROM payroll_periods WHERE id = $1 AND tenant_id = $2 FOR UPDATE",
            PERIOD_COLUMNS
        ))
        .bind(period_id)
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| {
            if is_lock_timeout(&err) {
                CoreError::LockTimeout {
                    period_id,
                    waited_ms: lock_timeout.as_millis() as u64,
                }
            } else {
                db_error(err)
            }
        })?;

        let period = match row {
            Some(row) => PayrollPeriod::try_from(row)?,
            None => return Err(CoreError::PeriodNotFound { period_id }),
        };
        debug!(period_id = %period_id, status = %period.status, "Locked period row");

        Ok(Box::new(PgPeriodTransaction { tx, period }))
    }
}

struct PgPeriodTransaction {
    tx: Transaction<'static, Postgres>,
    period: PayrollPeriod,
}

#[async_trait]
impl PeriodTransaction for PgPeriodTransaction {
    fn period(&self) -> &PayrollPeriod {
        &self.period
    }

    async fn results(&mut self) -> CoreResult<Vec<PayrollResult>> {
        let rows = sqlx::query_as::<_, ResultRow>(&format!(
            "SELECT {} FROM payroll_results WHERE period_id = $1 ORDER BY employee_id",
            RESULT_COLUMNS
        ))
        .bind(self.period.id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(rows.into_iter().map(PayrollResult::from).collect())
    }

    async fn replace_results(&mut self, results: Vec<PayrollResult>) -> CoreResult<()> {
        sqlx::query("DELETE FROM payroll_results WHERE period_id = $1")
            .bind(self.period.id)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;

        for result in results {
            if result.period_id != self.period.id {
                return Err(CoreError::storage(format!(
                    "result {} belongs to period {}, not {}",
                    result.id, result.period_id, self.period.id
                )));
            }
            sqlx::query(&format!(
                "INSERT INTO payroll_results ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                RESULT_COLUMNS
            ))
            .bind(result.id)
            .bind(&result.tenant_id)
            .bind(result.period_id)
            .bind(&result.employee_id)
            .bind(&result.employee_name)
            .bind(result.gross_pay)
            .bind(result.total_deductions)
            .bind(result.net_pay)
            .bind(Json(&result.lines))
            .bind(result.computed_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        }
        Ok(())
    }

    async fn upsert_payslip(&mut self, result: &PayrollResult) -> CoreResult<Payslip> {
        let fresh = Payslip::from_result(result);
        let row = sqlx::query_as::<_, PayslipRow>(&format!(
            "INSERT INTO payslips ({cols}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             ON CONFLICT (period_id, employee_id) DO UPDATE SET \
                 employee_name = EXCLUDED.employee_name, \
                 gross_pay = EXCLUDED.gross_pay, \
                 total_deductions = EXCLUDED.total_deductions, \
                 net_pay = EXCLUDED.net_pay, \
                 lines = EXCLUDED.lines, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {cols}",
            cols = PAYSLIP_COLUMNS
        ))
        .bind(fresh.id)
        .bind(&fresh.tenant_id)
        .bind(fresh.period_id)
        .bind(&fresh.employee_id)
        .bind(&fresh.employee_name)
        .bind(fresh.gross_pay)
        .bind(fresh.total_deductions)
        .bind(fresh.net_pay)
        .bind(Json(&fresh.lines))
        .bind(fresh.created_at)
        .bind(fresh.updated_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(Payslip::from(row))
    }

    async fn retain_payslips(&mut self, employee_ids: &[String]) -> CoreResult<u64> {
        let removed = sqlx::query(
            "DELETE FROM payslips WHERE period_id = $1 AND employee_id <> ALL($2)",
        )
        .bind(self.period.id)
        .bind(employee_ids)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?
        .rows_affected();
        Ok(removed)
    }

    async fn set_status(&mut self, status: PeriodStatus) -> CoreResult<()> {
        let now = Utc::now();
        let finalized_at = if status == PeriodStatus::Finalized {
            Some(now)
        } else {
            self.period.finalized_at
        };
        sqlx::query(
            "UPDATE payroll_periods SET status = $1, updated_at = $2, finalized_at = $3 \
             WHERE id = $4",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(finalized_at)
        .bind(self.period.id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;

        self.period.status = status;
        self.period.updated_at = now;
        self.period.finalized_at = finalized_at;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<PayrollPeriod> {
        let PgPeriodTransaction { tx, period } = *self;
        tx.commit().await.map_err(db_error)?;
        Ok(period)
    }
}

#[async_trait]
impl IdempotencyStore for PgStore {
    async fn find(&self, scope: &IdempotencyScope) -> CoreResult<Option<IdempotencyRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT tenant_id, user_id, idem_key, endpoint, request_hash, response_status, \
             response_content_type, response_body, created_at \
             FROM idempotency_records \
             WHERE tenant_id = $1 AND user_id = $2 AND idem_key = $3 AND endpoint = $4",
        )
        .bind(&scope.tenant_id)
        .bind(&scope.user_id)
        .bind(&scope.key)
        .bind(&scope.endpoint)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(IdempotencyRecord::try_from).transpose()
    }

    async fn save(&self, record: IdempotencyRecord) -> CoreResult<SaveOutcome> {
        let inserted = sqlx::query(
            "INSERT INTO idempotency_records \
             (tenant_id, user_id, idem_key, endpoint, request_hash, response_status, \
              response_content_type, response_body, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (tenant_id, user_id, idem_key, endpoint) DO NOTHING",
        )
        .bind(&record.scope.tenant_id)
        .bind(&record.scope.user_id)
        .bind(&record.scope.key)
        .bind(&record.scope.endpoint)
        .bind(&record.fingerprint)
        .bind(i32::from(record.response.status))
        .bind(&record.response.content_type)
        .bind(&record.response.body)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?
        .rows_affected();

        if inserted == 1 {
            return Ok(SaveOutcome::Inserted);
        }

        let existing = self.find(&record.scope).await?.ok_or_else(|| {
            CoreError::storage("idempotency record vanished after insert conflict")
        })?;
        if existing.fingerprint == record.fingerprint {
            Ok(SaveOutcome::Matched(existing))
        } else {
            Ok(SaveOutcome::Conflict(existing))
        }
    }
}
