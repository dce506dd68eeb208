//! Journey computation engine.
//!
//! [`JourneyEngine`] is built once with its collaborators injected
//! (punch store, contract store, calendar, ledger store) and runs the
//! whole pipeline for an employee-month: normalise punches, build daily
//! journeys, aggregate, value, detect violations and record the time
//! bank movement.  Everything except the ledger write is a pure
//! function of the fetched inputs.
//!
//! Company rollups use a dedicated [`rayon`] pool sized by the
//! configuration, so batch parallelism stays within what the backing
//! stores can serve.  Each employee yields its own `Result`; a failure
//! is recorded and the batch carries on.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::{DailyTimeRecord, DayStatus, EmployeeContract, MonthContext, OvertimePolicy, YearMonth};
use crate::monthly::aggregate_month;
use crate::normalizer::normalize_punches;
use crate::rollup::{CompanyRollup, EmployeeFailure, EmployeeMonthReport, EmployeeOutcome};
use crate::store::{Calendar, ContractStore, PunchStore};
use crate::time_bank::{LedgerStore, MonthMovement, TimeBank};
use crate::valuation::MonetaryValuator;
use crate::violations::ViolationDetector;
use chrono::Duration;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Cancellation and deadline for a batch.  Checked before each
/// employee starts; employees already running finish normally.
#[derive(Debug, Clone, Default)]
pub struct BatchControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl BatchControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: std::time::Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled("batch cancelled".into()));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Cancelled("batch deadline passed".into()));
        }
        Ok(())
    }
}

pub struct JourneyEngine {
    config: EngineConfig,
    punches: Arc<dyn PunchStore>,
    contracts: Arc<dyn ContractStore>,
    calendar: Arc<dyn Calendar>,
    time_bank: TimeBank,
    valuator: MonetaryValuator,
    detector: ViolationDetector,
    pool: rayon::ThreadPool,
}

impl JourneyEngine {
    pub fn new(
        config: EngineConfig,
        punches: Arc<dyn PunchStore>,
        contracts: Arc<dyn ContractStore>,
        calendar: Arc<dyn Calendar>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.rollup.max_workers)
            .thread_name(|i| format!("rollup-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("cannot start rollup pool: {e}")))?;
        Ok(Self {
            time_bank: TimeBank::new(config.time_bank.clone(), ledger),
            valuator: MonetaryValuator::new(config.pay.clone()),
            detector: ViolationDetector::new(config.journey.clone(), config.compliance.clone()),
            config,
            punches,
            contracts,
            calendar,
            pool,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn time_bank(&self) -> &TimeBank {
        &self.time_bank
    }

    /// Daily records of `period` for an employee under `contract`.
    /// Days outside the contract's span are treated as unscheduled.
    pub fn daily_records(
        &self,
        contract: &EmployeeContract,
        period: YearMonth,
    ) -> Result<Vec<DailyTimeRecord>> {
        let (first, last) = (period.first_day(), period.last_day());
        // one day either side so shifts crossing the month boundary are attributed correctly
        let punches = self.punches.punches(
            &contract.employee_id,
            first - Duration::days(1),
            last + Duration::days(1),
        )?;
        let mut records = normalize_punches(
            &contract.employee_id,
            &punches,
            first,
            last,
            self.calendar.as_ref(),
            &self.config.journey,
        )?;
        for record in records.iter_mut() {
            let covered = record.date >= contract.hire_date
                && contract.termination_date.map_or(true, |end| record.date <= end);
            if !covered {
                record.is_workday = false;
                if record.status == DayStatus::Absent {
                    record.status = DayStatus::Rest;
                }
            }
        }
        Ok(records)
    }

    /// Runs the full pipeline for one employee-month and records its
    /// time bank movement.
    #[instrument(skip(self, ctx), fields(period = %ctx.period))]
    pub fn compute_employee_month(
        &self,
        employee_id: &str,
        ctx: &MonthContext,
    ) -> Result<EmployeeMonthReport> {
        let contract = self.contracts.contract(employee_id)?;
        if !contract.is_active_in(ctx.period) {
            return Err(Error::InvalidInput(format!(
                "employee {employee_id} has no active contract in {}",
                ctx.period
            )));
        }

        let records = self.daily_records(&contract, ctx.period)?;
        let monthly = aggregate_month(
            employee_id,
            ctx.period,
            &records,
            contract.weekly_hours,
            &self.config.journey,
            self.calendar.as_ref(),
        );
        let monetary = self
            .valuator
            .valuate_with_policy(&monthly, &contract, ctx.overtime_policy)?;
        let granted: BTreeSet<_> = ctx.granted_rest_days.iter().copied().collect();
        let violations = self
            .detector
            .detect(&records, contract.weekly_hours, &granted);

        let movement = MonthMovement {
            accrual_minutes: match ctx.overtime_policy {
                OvertimePolicy::Banked => monthly.total_overtime_minutes(),
                OvertimePolicy::Paid => 0,
            },
            compensation_minutes: ctx.compensated_minutes,
        };
        let time_bank = self
            .time_bank
            .record_month(employee_id, ctx.period, movement)?;
        let expiring_soon = self.time_bank.expiring_soon(employee_id, ctx.as_of())?;

        if violations.has_critical_violations {
            warn!(
                employee_id,
                total = violations.total_violations,
                "critical compliance violations"
            );
        }
        Ok(EmployeeMonthReport {
            employee_id: employee_id.to_string(),
            monthly,
            monetary,
            time_bank,
            expiring_soon,
            violations,
        })
    }

    /// Runs every employee active in `company_id` for the month.
    /// Fails only when the employee list itself cannot be fetched.
    pub fn run_company_rollup(
        &self,
        company_id: &str,
        ctx: &MonthContext,
        control: &BatchControl,
    ) -> Result<CompanyRollup> {
        let employee_ids = self.contracts.active_employees(company_id, ctx.period)?;
        Ok(self.run_rollup_for(company_id, &employee_ids, ctx, control))
    }

    #[instrument(skip(self, employee_ids, ctx, control), fields(period = %ctx.period, employees = employee_ids.len()))]
    pub fn run_rollup_for(
        &self,
        company_id: &str,
        employee_ids: &[String],
        ctx: &MonthContext,
        control: &BatchControl,
    ) -> CompanyRollup {
        let started = Instant::now();
        let outcomes: Vec<EmployeeOutcome> = self.pool.install(|| {
            employee_ids
                .par_iter()
                .map(|employee_id| {
                    let result = control
                        .check()
                        .and_then(|_| self.compute_employee_month(employee_id, ctx))
                        .map_err(|err| {
                            warn!(employee_id = %employee_id, error = %err, "employee skipped in rollup");
                            EmployeeFailure::from(&err)
                        });
                    EmployeeOutcome {
                        employee_id: employee_id.clone(),
                        result,
                    }
                })
                .collect()
        });

        let rollup = CompanyRollup::from_outcomes(company_id, ctx.period, outcomes);
        info!(
            succeeded = rollup.totals.succeeded,
            failed = rollup.totals.failed,
            critical = rollup.critical_employees.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "company rollup finished"
        );
        rollup
    }
}
