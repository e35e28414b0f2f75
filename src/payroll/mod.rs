//! Payroll period workflow.
//!
//! [`PayrollService`] owns the period state machine
//! (`draft → running → reviewed → finalized → reopened`) and the finalize
//! transaction. [`SideEffects`] delivers payslip documents and
//! notifications after a finalize has committed.

mod orchestrator;
mod side_effects;

pub use orchestrator::{FinalizeOutcome, PayrollService, RunOutcome};
pub use side_effects::{
    DispatchReport, LogNotifier, LogRenderer, Notifier, PayslipRenderer, SideEffects,
};
