//! Post-commit side effects of a finalize.
//!
//! Rendering the payslip document and telling the employee about it happen
//! after the finalize transaction has committed. They run on a detached
//! task, retry independently, and never change the outcome reported to the
//! caller. A failed render is recovered with the regenerate endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SideEffectsConfig;
use crate::error::{CoreError, CoreResult};
use crate::models::Payslip;

/// Produces the employee-facing document for a payslip.
#[async_trait]
pub trait PayslipRenderer: Send + Sync {
    /// Renders (or re-renders) the document for `payslip`.
    async fn render(&self, payslip: &Payslip) -> CoreResult<()>;
}

/// Tells an employee that a payslip is available.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends the "payslip ready" notification.
    async fn payslip_ready(&self, payslip: &Payslip) -> CoreResult<()>;
}

/// Renderer that only logs. Used when no document service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRenderer;

#[async_trait]
impl PayslipRenderer for LogRenderer {
    async fn render(&self, payslip: &Payslip) -> CoreResult<()> {
        info!(
            payslip_id = %payslip.id,
            period_id = %payslip.period_id,
            employee_id = %payslip.employee_id,
            net_pay = %payslip.net_pay,
            "Rendered payslip"
        );
        Ok(())
    }
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn payslip_ready(&self, payslip: &Payslip) -> CoreResult<()> {
        info!(
            payslip_id = %payslip.id,
            employee_id = %payslip.employee_id,
            "Payslip ready notification sent"
        );
        Ok(())
    }
}

/// Counts from one dispatch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Payslips whose document was rendered.
    pub rendered: usize,
    /// Payslips whose employee was notified.
    pub notified: usize,
    /// Payslips that could not be rendered or notified.
    pub failed: usize,
}

/// Dispatches rendering and notification for committed payslips.
#[derive(Clone)]
pub struct SideEffects {
    renderer: Arc<dyn PayslipRenderer>,
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
    backoff: Duration,
}

impl SideEffects {
    /// Creates a dispatcher over the given collaborators.
    pub fn new(
        renderer: Arc<dyn PayslipRenderer>,
        notifier: Arc<dyn Notifier>,
        config: &SideEffectsConfig,
    ) -> Self {
        Self {
            renderer,
            notifier,
            max_attempts: config.render_max_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// A dispatcher using [`LogRenderer`] and [`LogNotifier`].
    pub fn logging(config: &SideEffectsConfig) -> Self {
        Self::new(Arc::new(LogRenderer), Arc::new(LogNotifier), config)
    }

    /// Spawns delivery of `payslips` on a detached task.
    ///
    /// The handle may be dropped; it is returned so callers that care can
    /// wait for the report.
    pub fn dispatch(&self, period_id: Uuid, payslips: Vec<Payslip>) -> JoinHandle<DispatchReport> {
        let effects = self.clone();
        tokio::spawn(async move {
            let report = effects.deliver(&payslips).await;
            if report.failed > 0 {
                warn!(
                    period_id = %period_id,
                    failed = report.failed,
                    rendered = report.rendered,
                    "Some payslip side effects failed; use regenerate to recover"
                );
            } else {
                debug!(
                    period_id = %period_id,
                    rendered = report.rendered,
                    notified = report.notified,
                    "Payslip side effects delivered"
                );
            }
            report
        })
    }

    /// Renders then notifies each payslip in turn.
    pub async fn deliver(&self, payslips: &[Payslip]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for payslip in payslips {
            if let Err(err) = self.render(payslip).await {
                warn!(payslip_id = %payslip.id, error = %err, "Giving up on payslip render");
                report.failed += 1;
                continue;
            }
            report.rendered += 1;

            match self.notifier.payslip_ready(payslip).await {
                Ok(()) => report.notified += 1,
                Err(err) => {
                    warn!(payslip_id = %payslip.id, error = %err, "Payslip notification failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Renders one payslip, retrying with linear backoff.
    ///
    /// Fails with `Rendering` once every attempt has failed.
    pub async fn render(&self, payslip: &Payslip) -> CoreResult<()> {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match self.renderer.render(payslip).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(
                        payslip_id = %payslip.id,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Payslip render attempt failed"
                    );
                    last_error = err.to_string();
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff * attempt).await;
            }
        }
        Err(CoreError::Rendering {
            payslip_id: payslip.id,
            message: last_error,
        })
    }
}
